//! Remote executor that pipes scripts to `ssh <host> bash -s`.

use std::process::Stdio;

use evtrace_core::config::RemoteConfig;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{RemoteExecOutput, RemoteExecRequest, RemoteExecutor};
use crate::error::SearchError;
use crate::filter::shell_quote;

/// Exit status ssh reserves for its own connection errors.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// Runs remote scripts over ssh.
///
/// The script is written to the remote shell's stdin, so no quoting of the
/// script body is needed on the command line.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    command: String,
    user: Option<String>,
    options: Vec<String>,
}

impl SshExecutor {
    /// Creates an executor from the `[remote]` config section.
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            command: config.command.clone(),
            user: config.user.clone(),
            options: config.options.clone(),
        }
    }

    fn destination(&self, hostname: &str) -> String {
        match &self.user {
            Some(user) => format!("{user}@{hostname}"),
            None => hostname.to_owned(),
        }
    }
}

/// Prepends `export` lines for the request environment to the script body.
fn script_with_env(request: &RemoteExecRequest) -> String {
    if request.env.is_empty() {
        return request.script.clone();
    }
    let mut keys: Vec<&String> = request.env.keys().collect();
    keys.sort();

    let mut script = String::new();
    for key in keys {
        if let Some(value) = request.env.get(key) {
            script.push_str(&format!("export {key}={}\n", shell_quote(value)));
        }
    }
    script.push_str(&request.script);
    script
}

impl RemoteExecutor for SshExecutor {
    async fn exec(&self, request: &RemoteExecRequest) -> Result<RemoteExecOutput, SearchError> {
        let transport = |reason: String| SearchError::RemoteTransport {
            host: request.hostname.clone(),
            reason,
        };

        let destination = self.destination(&request.hostname);
        debug!(
            host = %request.hostname,
            destination = %destination,
            timeout_ms = request.timeout.as_millis() as u64,
            "dispatching remote search"
        );

        let mut child = Command::new(&self.command)
            .args(&self.options)
            .arg(&destination)
            .arg("bash -s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| transport(format!("failed to spawn {}: {e}", self.command)))?;

        let script = script_with_env(request);
        let run = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(script.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(request.timeout, run)
            .await
            .map_err(|_| transport(format!("timed out after {:?}", request.timeout)))?
            .map_err(|e| transport(e.to_string()))?;

        let exit_status = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if exit_status == SSH_TRANSPORT_EXIT {
            return Err(transport(stderr.trim().to_owned()));
        }

        Ok(RemoteExecOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}
