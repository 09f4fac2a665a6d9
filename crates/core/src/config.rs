use crate::command::{Command, MapPlacement};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Log levels the external tool understands for `-loglevel`.
pub const LOG_LEVELS: &[&str] = &[
    "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub executable: String,
    pub overwrite: bool,
    pub hide_banner: bool,
    pub loglevel: Option<String>,
    pub map_placement: MapPlacement,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            executable: "ffmpeg".to_string(),
            overwrite: true,
            hide_banner: true,
            loglevel: None,
            map_placement: MapPlacement::Leading,
        }
    }
}

impl CompilerConfig {
    /// Empty command carrying this configuration's executable and global options.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(self.executable.clone());
        cmd.set_map_placement(self.map_placement);
        if self.hide_banner {
            cmd.global_flag("hide_banner");
        }
        if self.overwrite {
            cmd.global_flag("y");
        }
        if let Some(level) = &self.loglevel {
            cmd.global_option("loglevel", level);
        }
        cmd
    }
}

pub fn load_config(path: Option<&std::path::Path>) -> Result<CompilerConfig> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<CompilerConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            CompilerConfig::default()
        }
    } else {
        tracing::info!("No config path provided, using defaults");
        CompilerConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &CompilerConfig) -> Result<()> {
    if config.executable.trim().is_empty() {
        anyhow::bail!("executable cannot be empty");
    }

    if let Some(level) = &config.loglevel {
        if !LOG_LEVELS.contains(&level.as_str()) {
            anyhow::bail!(
                "loglevel must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                level
            );
        }
    }

    Ok(())
}
