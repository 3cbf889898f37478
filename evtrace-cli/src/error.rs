//! CLI-specific error types and exit code mapping

use evtrace_core::error::EvtraceError;
use evtrace_search::SearchError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad command-line value (time argument, section name, ...).
    #[error("usage error: {0}")]
    Usage(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Search engine error.
    #[error("{0}")]
    Search(#[from] SearchError),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from evtrace-core.
    #[error("{0}")]
    Core(#[from] EvtraceError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success (also: stdout closed)    |
    /// | 1    | General / search error           |
    /// | 2    | Configuration or usage error     |
    /// | 10   | IO error                         |
    /// | 130  | Interrupted                      |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Usage(_) => 2,
            Self::Io(_) => 10,
            Self::Search(SearchError::Output(_)) => 10,
            Self::Search(SearchError::Config { .. }) => 2,
            Self::Search(SearchError::Cancelled) => 130,
            Self::Core(EvtraceError::Config(_)) => 2,
            Self::Core(EvtraceError::Io(_)) => 10,
            Self::Command(_) | Self::Search(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }

    /// Whether the error is a write into a closed stdout pipe.
    ///
    /// `evtrace search | head` ends this way and is not a failure.
    pub fn is_broken_pipe(&self) -> bool {
        let io = match self {
            Self::Io(e) | Self::Search(SearchError::Output(e)) | Self::Core(EvtraceError::Io(e)) => e,
            _ => return false,
        };
        io.kind() == std::io::ErrorKind::BrokenPipe
    }
}
