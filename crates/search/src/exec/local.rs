//! Local shell executor backed by `tokio::process`.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, LocalExecutor};
use crate::error::SearchError;

/// Runs commands through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    /// Creates an executor using the given shell binary.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Returns the configured shell.
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("/bin/bash")
    }
}

impl LocalExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput, SearchError> {
        debug!(shell = %self.shell, command, "spawning local search");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SearchError::LocalExecFailed {
                source_name: self.shell.clone(),
                reason: format!("failed to spawn: {e}"),
            })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
