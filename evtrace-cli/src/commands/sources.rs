//! `evtrace sources` command handler

use std::io::Write;

use serde::Serialize;

use evtrace_core::config::EvtraceConfig;
use evtrace_search::{Source, SourceRegistry};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `sources` command.
pub fn execute(config: &EvtraceConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let registry = SourceRegistry::with_defs(&config.sources)?;
    writer.render(&SourcesReport::from_registry(&registry))
}

/// Catalogue listing.
#[derive(Debug, Serialize)]
pub struct SourcesReport {
    pub sources: Vec<SourceRow>,
}

/// One catalogue entry.
#[derive(Debug, Serialize)]
pub struct SourceRow {
    pub name: String,
    /// `global`, or the service whose instances hold the log
    pub scope: String,
    pub current: String,
    pub rotation: String,
}

impl SourcesReport {
    pub fn from_registry(registry: &SourceRegistry) -> Self {
        Self {
            sources: registry.sources().iter().map(|s| SourceRow::from(s.as_ref())).collect(),
        }
    }
}

impl From<&Source> for SourceRow {
    fn from(source: &Source) -> Self {
        let scope = match source.service() {
            Some(service) => format!("service:{service}"),
            None => "global".to_owned(),
        };
        Self {
            name: source.name().to_owned(),
            scope,
            current: source.current().to_owned(),
            rotation: source.rotation().to_string(),
        }
    }
}

impl Render for SourcesReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{}",
            format!("{:<18} {:<20} {:<8} {}", "NAME", "SCOPE", "ROTATION", "CURRENT").bold()
        )?;
        for row in &self.sources {
            writeln!(
                w,
                "{:<18} {:<20} {:<8} {}",
                row.name, row.scope, row.rotation, row.current
            )?;
        }
        writeln!(w)?;
        writeln!(w, "{} sources", self.sources.len())?;
        Ok(())
    }
}
