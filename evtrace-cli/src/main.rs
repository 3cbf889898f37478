//! evtrace -- chronological search across fleet service logs
//!
//! Search results go to stdout. Logs and errors go to stderr.

mod cli;
mod commands;
mod error;
mod logging;
mod output;
mod time;

use std::process::ExitCode;

use clap::Parser;
use evtrace_core::config::GeneralConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<CliError>() {
            Some(cli_err) if cli_err.is_broken_pipe() => ExitCode::SUCCESS,
            Some(cli_err) => {
                eprintln!("evtrace: {cli_err}");
                exit_code(cli_err.exit_code())
            }
            None => {
                eprintln!("evtrace: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    let explicit = cli.config_explicit();
    let writer = OutputWriter::new(cli.output);
    let log_level = cli.log_level.as_deref();

    match cli.command {
        // `config` reports on the file itself, so a broken file is its
        // output rather than a startup failure.
        Commands::Config(args) => {
            init_logging(&GeneralConfig::default(), log_level, false)?;
            commands::config::execute(args, &config_path, explicit, &writer).await?;
        }
        Commands::Sources => {
            let config = commands::load_config(&config_path, explicit).await?;
            init_logging(&config.general, log_level, false)?;
            commands::sources::execute(&config, &writer)?;
        }
        Commands::Search(args) => {
            let config = commands::load_config(&config_path, explicit).await?;
            init_logging(&config.general, log_level, args.verbose)?;
            evtrace_core::metrics::describe_all();

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("interrupt received, cancelling search");
                    on_signal.cancel();
                }
            });
            commands::search::execute(args, config, cancel).await?;
        }
    }

    Ok(())
}

fn init_logging(general: &GeneralConfig, level: Option<&str>, verbose: bool) -> anyhow::Result<()> {
    let mut general = general.clone();
    if let Some(level) = level {
        general.log_level = level.to_owned();
    }
    logging::init_tracing(&general, verbose)
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
