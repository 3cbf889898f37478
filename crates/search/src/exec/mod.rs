//! Execution collaborators for per-target searches.
//!
//! The [`LocalExecutor`] and [`RemoteExecutor`] traits abstract the two
//! execution substrates. Production code uses [`ShellExecutor`] and
//! [`SshExecutor`]; tests use mock implementations of the same traits.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐
//! │ Dispatcher │
//! └─────┬──────┘
//!       │ local-capable?
//!   ┌───┴────────────┐
//!   ▼                ▼
//! ┌──────────────┐ ┌───────────────┐
//! │LocalExecutor │ │RemoteExecutor │ (traits)
//! └──────┬───────┘ └───────┬───────┘
//!        ▼                 ▼
//!   bash -c PIPELINE   ssh HOST bash -s < SCRIPT
//! ```

mod local;
mod ssh;

pub use local::ShellExecutor;
pub use ssh::SshExecutor;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use crate::error::SearchError;

/// Captured result of a local shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Creates a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Runs a shell command on the invoking host.
pub trait LocalExecutor: Send + Sync + 'static {
    /// Runs `command` through the shell with a null stdin and captured stdout.
    ///
    /// Returns `Err` only when the process could not be spawned or waited on.
    /// A non-zero exit status is reported through [`CommandOutput::status`].
    fn run(&self, command: &str) -> impl Future<Output = Result<CommandOutput, SearchError>> + Send;
}

/// A script to run on a remote host.
#[derive(Debug, Clone)]
pub struct RemoteExecRequest {
    /// Full script text, interpreter line included.
    pub script: String,
    /// Target host UUID.
    pub host_uuid: String,
    /// Target hostname.
    pub hostname: String,
    /// Execution timeout.
    pub timeout: Duration,
    /// Extra environment for the script.
    pub env: HashMap<String, String>,
}

/// Result of a remote script execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteExecOutput {
    /// Exit status reported by the remote agent.
    pub exit_status: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Runs scripts on remote hosts.
///
/// Transport failures (connection refused, timeout) are returned as
/// [`SearchError::RemoteTransport`]. A script that ran but exited non-zero is
/// returned as `Ok` with the exit status set; the dispatcher decides how to
/// treat it.
pub trait RemoteExecutor: Send + Sync + 'static {
    /// Executes the request and collects its output.
    fn exec(
        &self,
        request: &RemoteExecRequest,
    ) -> impl Future<Output = Result<RemoteExecOutput, SearchError>> + Send;
}

/// Placeholder remote executor for deployments without remote access.
///
/// Every call fails. The search plan checks for remote targets before any
/// I/O, so this is only reached if that check is bypassed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemote;

impl RemoteExecutor for NoRemote {
    async fn exec(&self, request: &RemoteExecRequest) -> Result<RemoteExecOutput, SearchError> {
        Err(SearchError::RemoteTransport {
            host: request.hostname.clone(),
            reason: "remote execution is not configured".to_owned(),
        })
    }
}
