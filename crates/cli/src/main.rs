use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod exec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ffgraph")]
#[command(about = "Compile filter-graph job files into ffmpeg command lines", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// How to print the compiled command
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Execute the compiled command after printing it
    #[arg(long)]
    run: bool,

    /// Job file describing inputs, filter graphs and outputs
    #[arg(value_name = "JOB")]
    job: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match ffgraph_core::config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!("Compiling job {:?}", args.job);
    let job = ffgraph_core::job::load_job(&args.job)?;
    let command = match job.compile(&config) {
        Ok(cmd) => cmd,
        Err(e) => {
            error!("Failed to compile job: {:#}", e);
            return Err(e);
        }
    };

    let invocation = command.to_command()?;
    match args.format {
        OutputFormat::Text => println!("{}", invocation.to_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&invocation)?),
    }

    if args.run {
        if let Err(e) = exec::run_invocation(&invocation).await {
            error!("Execution failed: {:#}", e);
            return Err(e);
        }
    }

    Ok(())
}
