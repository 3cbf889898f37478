//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_PATH: &str = "evtrace.toml";

/// evtrace -- search structured service logs across a fleet of hosts
/// and merge them into one chronological stream.
///
/// Use `evtrace <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "evtrace", version, about, long_about = None)]
pub struct Cli {
    /// Path to the evtrace.toml configuration file
    /// (default: ./evtrace.toml when present, otherwise built-in defaults).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format for informational commands (`sources`, `config`).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Whether the config path was given explicitly.
    pub fn config_explicit(&self) -> bool {
        self.config.is_some()
    }

    /// The config path in effect.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search logs and print matching records in time order.
    Search(SearchArgs),

    /// List the known log sources.
    Sources,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- search ----

/// Search event records across hosts.
///
/// By default every source is searched for records carrying an `evt`
/// field. Request ids given as arguments restrict the search to those
/// requests.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Request ids to search for.
    pub req_ids: Vec<String>,

    /// Start of the search: a duration ago (`90m`, `2h`, `1d`) or a date
    /// (`2015-02-13T20:15:00Z`, `2015-02-13T20:15`, `2015-02-13`).
    #[arg(short, long, default_value = "1h")]
    pub time: String,

    /// Sources to search (repeatable or comma separated; default: all).
    #[arg(short, long = "source", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Hosts to search, by uuid or hostname (repeatable or comma separated).
    #[arg(short = 'n', long = "host", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Emit a trace-event JSON array instead of JSON lines.
    #[arg(short = 'E', long)]
    pub event_trace: bool,

    /// Search with a single raw pattern instead of the default filters.
    #[arg(short = 'x', long = "raw")]
    pub raw: Option<String>,

    /// Show progress on stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

// ---- config ----

/// Manage evtrace configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, search, topology, remote, sources).
        #[arg(long)]
        section: Option<String>,
    },
}
