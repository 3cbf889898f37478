//! Command handlers -- one module per subcommand

pub mod config;
pub mod search;
pub mod sources;

use std::path::Path;

use evtrace_core::config::EvtraceConfig;

use crate::error::CliError;

/// Load the effective configuration.
///
/// An explicit path must exist. The implicit default path is optional:
/// when it is missing, built-in defaults plus environment overrides apply.
pub async fn load_config(path: &Path, explicit: bool) -> Result<EvtraceConfig, CliError> {
    if explicit || tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(EvtraceConfig::load(path).await?);
    }

    let mut config = EvtraceConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
