// Hands a compiled invocation to the external tool

use anyhow::Result;
use ffgraph_core::Invocation;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Spawn the tool, wait for it, and fail with its stderr on a non-zero exit.
pub async fn run_invocation(invocation: &Invocation) -> Result<()> {
    let mut cmd = Command::new(&invocation.executable);
    cmd.args(&invocation.args);
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    info!("Running {}", invocation.executable);
    let mut child = cmd
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to spawn {}: {}", invocation.executable, e))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr"))?;

    let stderr_task = tokio::spawn(async move {
        let reader = BufReader::new(stderr);
        let mut lines = reader.lines();
        let mut output = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("{}", line);
            output.push(line);
        }
        output
    });

    let status = child
        .wait()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for {}: {}", invocation.executable, e))?;

    let stderr_lines = stderr_task
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read stderr: {}", e))?;

    if !status.success() {
        return Err(anyhow::anyhow!(
            "{} failed with exit code: {:?}\nStderr:\n{}",
            invocation.executable,
            status.code(),
            stderr_lines.join("\n")
        ));
    }

    info!("{} finished successfully", invocation.executable);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_executable_fails_to_spawn() {
        let invocation = Invocation {
            executable: "/nonexistent/ffgraph-test-binary".to_string(),
            args: vec!["-version".to_string()],
        };

        let err = run_invocation(&invocation).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let invocation = Invocation {
            executable: "sh".to_string(),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
        };

        let err = run_invocation(&invocation).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Some(3)"));
        assert!(message.contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run() {
        let invocation = Invocation {
            executable: "true".to_string(),
            args: vec![],
        };

        run_invocation(&invocation).await.unwrap();
    }
}
