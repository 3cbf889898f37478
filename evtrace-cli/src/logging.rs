//! Logging initialization for the evtrace binary.
//!
//! Configures `tracing-subscriber` from the `[general]` config section.
//! Logs always go to stderr; stdout is reserved for search output.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use evtrace_core::config::GeneralConfig;

/// Crates whose progress output `--verbose` turns on.
const VERBOSE_TARGETS: &[&str] = &["evtrace", "evtrace_search", "evtrace_core"];

/// Build the filter directive for a base level.
///
/// `verbose` raises the evtrace crates to `debug` without making
/// dependencies noisy.
pub fn filter_directive(level: &str, verbose: bool) -> String {
    if !verbose {
        return level.to_owned();
    }
    let mut directive = level.to_owned();
    for target in VERBOSE_TARGETS {
        directive.push_str(&format!(",{target}=debug"));
    }
    directive
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once. `RUST_LOG` takes precedence over the
/// configured level.
///
/// # Formats
///
/// * `"json"` - JSON lines
/// * `"pretty"` - human-readable output
pub fn init_tracing(config: &GeneralConfig, verbose: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.log_level, verbose)));

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
                })?;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                config.log_format
            ));
        }
    }

    Ok(())
}
