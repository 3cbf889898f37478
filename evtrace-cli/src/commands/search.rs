//! `evtrace search` command handler

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use evtrace_core::config::EvtraceConfig;
use evtrace_search::{
    Filter, OutputMode, SearchConfig, SearchContext, SearchRequest, ShellExecutor, SourceRegistry,
    SshExecutor, StaticTopology,
};

use crate::cli::SearchArgs;
use crate::error::CliError;
use crate::time;

/// Execute the `search` command, streaming results to stdout.
///
/// # Errors
///
/// Returns `CliError::Usage` for a bad `--time` value and `CliError::Search`
/// for every planning or execution failure.
pub async fn execute(
    args: SearchArgs,
    config: EvtraceConfig,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let request = build_request(&args, Utc::now())?;

    let registry = SourceRegistry::with_defs(&config.sources)?;
    let topology = Arc::new(StaticTopology::from_config(&config.topology));
    let local = Arc::new(ShellExecutor::new(config.search.shell.clone()));
    let remote = config
        .remote
        .enabled
        .then(|| Arc::new(SshExecutor::from_config(&config.remote)));
    let search_config = SearchConfig::from_core(&config.search, &config.topology);

    let ctx = SearchContext::new(topology, local, remote, registry, search_config)?;

    info!(
        start = %request.start,
        output = %request.output,
        filters = request.filters.len(),
        "starting search"
    );

    let mut stdout = tokio::io::stdout();
    let summary = ctx
        .search_events_until(&request, &mut stdout, &cancel)
        .await?;

    debug!(
        buckets = summary.buckets,
        targets = summary.targets,
        hits = summary.hits,
        rendered = summary.rendered,
        "search complete"
    );
    Ok(())
}

/// Turn command-line arguments into a search request.
///
/// `-x` replaces the default filters. Otherwise records must carry `evt`
/// and, when request ids are given, a matching `req_id`.
pub fn build_request(args: &SearchArgs, now: DateTime<Utc>) -> Result<SearchRequest, CliError> {
    let start = time::parse_start(&args.time, now)?;

    let filters = match &args.raw {
        Some(pattern) => vec![Filter::raw(pattern.clone())],
        None => {
            let mut filters = vec![Filter::exists("evt")];
            if !args.req_ids.is_empty() {
                filters.push(Filter::one_of("req_id", args.req_ids.iter().cloned()));
            }
            filters
        }
    };

    let output = if args.event_trace {
        OutputMode::TraceEvent
    } else {
        OutputMode::Json
    };

    let mut request = SearchRequest::new(start, now)
        .with_hosts(args.hosts.clone())
        .with_filters(filters)
        .with_output(output);
    if !args.sources.is_empty() {
        request = request.with_sources(args.sources.clone());
    }
    Ok(request)
}
