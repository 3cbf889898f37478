//! 검색 조합 -- 윈도우 스케줄러, 팬아웃 병합기, 렌더러를 하나의 스트림으로 연결
//!
//! # 흐름
//! ```text
//! SearchRequest
//!     │ plan(): 소스 선택, 필터 컴파일, 윈도우 생성, 타겟 해석 (I/O 이전 검증)
//!     ▼
//! ┌──────────────┐  mpsc(bounded)  ┌──────────┐
//! │ 버킷 순차 처리 │ ──── Hit ────▶ │ Renderer │ ──▶ AsyncWrite
//! │ (FanOutMerger)│                 └──────────┘
//! └──────────────┘
//! ```
//!
//! 생산자와 소비자는 같은 태스크에서 `tokio::join!`으로 함께 구동됩니다.
//! 실행 중 에러가 나도 이미 내보낸 버킷의 출력은 유효한 스트림으로 마무리됩니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use evtrace_core::metrics as m;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::dispatch::{Dispatcher, Hit};
use crate::error::SearchError;
use crate::exec::{LocalExecutor, RemoteExecutor};
use crate::filter::{Filter, FilterChain, compile};
use crate::merger::FanOutMerger;
use crate::render::OutputMode;
use crate::source::{Source, SourceRegistry};
use crate::target::{ResolveOptions, SearchTarget, requires_remote, resolve_targets};
use crate::topology::TopologyProvider;
use crate::window::SearchWindow;

/// 검색 요청
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// 검색할 소스 이름 (None이면 전체)
    pub sources: Option<Vec<String>>,
    /// 검색할 호스트 이름/UUID (비어있으면 전체)
    pub hosts: Vec<String>,
    /// 필터 목록
    pub filters: Vec<Filter>,
    /// 검색 시작 시각
    pub start: DateTime<Utc>,
    /// 기준 시각
    pub now: DateTime<Utc>,
    /// 출력 모드
    pub output: OutputMode,
}

impl SearchRequest {
    /// 기본 필터(`evt` 존재)로 전체 소스를 검색하는 요청을 생성합니다.
    pub fn new(start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            sources: None,
            hosts: Vec::new(),
            filters: vec![Filter::exists("evt")],
            start,
            now,
            output: OutputMode::Json,
        }
    }

    /// 검색할 소스를 지정합니다.
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// 검색할 호스트를 지정합니다.
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    /// 필터를 교체합니다.
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// 출력 모드를 지정합니다.
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }
}

/// I/O 이전에 검증이 끝난 검색 계획
#[derive(Debug, Clone)]
pub struct SearchPlan {
    /// 선택된 소스
    pub sources: Vec<Arc<Source>>,
    /// 해석된 타겟
    pub targets: Vec<SearchTarget>,
    /// 시간 윈도우
    pub window: SearchWindow,
    /// 컴파일된 필터
    pub chain: Arc<FilterChain>,
}

impl SearchPlan {
    /// 원격 실행이 필요한 타겟 수를 반환합니다.
    pub fn remote_targets(&self) -> usize {
        requires_remote(&self.targets)
    }

    /// 서로 다른 호스트 수를 반환합니다.
    pub fn host_count(&self) -> usize {
        let mut hosts: Vec<&str> = self.targets.iter().map(|t| t.host.uuid.as_str()).collect();
        hosts.sort_unstable();
        hosts.dedup();
        hosts.len()
    }
}

/// 검색 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// 처리 완료된 버킷 수
    pub buckets: usize,
    /// 검색 타겟 수
    pub targets: usize,
    /// 병합기가 내보낸 히트 수
    pub hits: usize,
    /// 렌더러가 출력한 레코드 수
    pub rendered: usize,
}

/// 검색 컨텍스트
///
/// 토폴로지, 실행기, 레지스트리, 설정을 명시적으로 보관합니다.
/// 한 컨텍스트로 여러 검색을 순차 또는 동시에 실행할 수 있습니다.
pub struct SearchContext<T, L, R> {
    topology: Arc<T>,
    dispatcher: Dispatcher<L, R>,
    registry: Arc<SourceRegistry>,
    config: Arc<SearchConfig>,
}

impl<T, L, R> SearchContext<T, L, R>
where
    T: TopologyProvider,
    L: LocalExecutor,
    R: RemoteExecutor,
{
    /// 새 검색 컨텍스트를 생성합니다.
    ///
    /// # Errors
    /// 설정 검증 실패 시 [`SearchError::Config`]
    pub fn new(
        topology: Arc<T>,
        local: Arc<L>,
        remote: Option<Arc<R>>,
        registry: SourceRegistry,
        config: SearchConfig,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            topology,
            dispatcher: Dispatcher::new(local, remote, Arc::clone(&config)),
            registry: Arc::new(registry),
            config,
        })
    }

    /// 소스 레지스트리를 반환합니다.
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// 설정을 반환합니다.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// 검색 계획을 세웁니다.
    ///
    /// 로그 검색 I/O 이전에 모든 설정/필터 오류를 드러냅니다.
    ///
    /// # Errors
    /// [`SearchError::UnknownSource`], [`SearchError::TimeRangeTooLarge`],
    /// 필터 컴파일 에러, [`SearchError::UnknownHost`], glob 생성 에러,
    /// [`SearchError::RemoteUnavailable`]
    pub async fn plan(&self, request: &SearchRequest) -> Result<SearchPlan, SearchError> {
        let sources = self.registry.select(request.sources.as_deref())?;
        let chain = Arc::new(compile(&request.filters)?);
        let window = SearchWindow::bounded(request.start, request.now, self.config.max_range())?;

        let options = ResolveOptions {
            hosts: request.hosts.clone(),
            exclude_virtual: self.config.exclude_virtual_hosts,
            local_host: self.config.local_host.clone(),
            invoking_scope: self.config.invoking_scope.clone(),
        };
        let targets = resolve_targets(self.topology.as_ref(), &sources, &options).await?;

        for target in &targets {
            for bucket in window.buckets() {
                target.source.resolve_glob(&target.scope, bucket)?;
            }
        }

        let remote = requires_remote(&targets);
        if remote > 0 && !self.dispatcher.has_remote() {
            return Err(SearchError::RemoteUnavailable { count: remote });
        }

        Ok(SearchPlan {
            sources,
            targets,
            window,
            chain,
        })
    }

    /// 이벤트를 검색하여 시간순으로 `writer`에 씁니다.
    pub async fn search_events<W>(
        &self,
        request: &SearchRequest,
        writer: &mut W,
    ) -> Result<SearchSummary, SearchError>
    where
        W: AsyncWrite + Unpin,
    {
        self.search_events_until(request, writer, &CancellationToken::new())
            .await
    }

    /// 취소 토큰과 함께 이벤트를 검색합니다.
    ///
    /// # Errors
    /// 계획 단계 에러, 실행 에러(첫 번째 실패 타겟), 출력 쓰기 에러,
    /// 취소 시 [`SearchError::Cancelled`]
    pub async fn search_events_until<W>(
        &self,
        request: &SearchRequest,
        writer: &mut W,
        cancel: &CancellationToken,
    ) -> Result<SearchSummary, SearchError>
    where
        W: AsyncWrite + Unpin,
    {
        let plan = self.plan(request).await?;
        info!(
            sources = plan.sources.len(),
            hosts = plan.host_count(),
            buckets = plan.window.buckets().len(),
            "searching {} sources across {} hosts in {} buckets",
            plan.sources.len(),
            plan.host_count(),
            plan.window.buckets().len()
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let merger = FanOutMerger::new(self.dispatcher.clone(), self.config.concurrency);
        // 출력 쓰기가 실패하면 진행 중인 타겟 검색도 즉시 멈춤
        let run_cancel = cancel.child_token();

        let producer = async {
            // 에러로 일찍 반환해도 송신자가 닫혀야 소비자가 끝남
            let tx = tx;
            let mut summary = SearchSummary {
                targets: plan.targets.len(),
                ..SearchSummary::default()
            };
            for (idx, bucket) in plan.window.buckets().iter().enumerate() {
                debug!(bucket = %bucket, "searching bucket");
                summary.hits += merger
                    .run(
                        &plan.targets,
                        bucket,
                        Arc::clone(&plan.chain),
                        plan.window.cutoff_for(idx),
                        &tx,
                        &run_cancel,
                    )
                    .await?;
                summary.buckets += 1;
                metrics::counter!(m::SEARCH_BUCKETS_TOTAL).increment(1);
            }
            drop(tx);
            Ok::<_, SearchError>(summary)
        };

        let consumer = async {
            let consumed = consume(rx, request.output, writer).await;
            if consumed.is_err() {
                run_cancel.cancel();
            }
            consumed
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        // 쓰기 실패는 생산자 쪽 채널 에러의 원인이므로 먼저 보고
        let rendered = consumed?;
        let mut summary = produced?;
        summary.rendered = rendered;
        Ok(summary)
    }
}

async fn consume<W>(
    mut rx: mpsc::Receiver<Hit>,
    output: OutputMode,
    writer: &mut W,
) -> Result<usize, SearchError>
where
    W: AsyncWrite + Unpin,
{
    let mut renderer = output.renderer();
    let mut buf = Vec::with_capacity(4096);
    let mut rendered = 0;

    while let Some(hit) = rx.recv().await {
        if renderer.render(&hit, &mut buf)? {
            rendered += 1;
        }
        if !buf.is_empty() {
            writer.write_all(&buf).await?;
            buf.clear();
        }
        if rx.is_empty() {
            writer.flush().await?;
        }
    }

    renderer.finish(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use chrono::{Duration, TimeZone};
    use evtrace_core::types::{Host, ServiceInstance};

    use super::*;
    use crate::exec::{CommandOutput, NoRemote, RemoteExecOutput, RemoteExecRequest};
    use crate::topology::StaticTopology;

    struct EmptyLocal;

    impl LocalExecutor for EmptyLocal {
        async fn run(&self, _command: &str) -> Result<CommandOutput, SearchError> {
            Ok(CommandOutput::default())
        }
    }

    struct EmptyRemote;

    impl RemoteExecutor for EmptyRemote {
        async fn exec(&self, _request: &RemoteExecRequest) -> Result<RemoteExecOutput, SearchError> {
            Ok(RemoteExecOutput::default())
        }
    }

    /// 시간 버킷에는 레코드 하나를 돌려주고, 현재 로그 검색은 끝나지 않는 원격 실행기
    struct StallingRemote;

    impl RemoteExecutor for StallingRemote {
        async fn exec(&self, request: &RemoteExecRequest) -> Result<RemoteExecOutput, SearchError> {
            if request.script.contains("smartdc-agent-vm-agent:default.log") {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                return Ok(RemoteExecOutput::default());
            }
            Ok(RemoteExecOutput {
                exit_status: 0,
                stdout: r#"{"time":"2015-02-13T11:45:00Z","evt":{"name":"boot"}}"#.to_owned(),
                stderr: String::new(),
            })
        }
    }

    /// 모든 쓰기가 실패하는 출력
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 2, 13, 12, 30, 0).unwrap()
    }

    fn topology() -> Arc<StaticTopology> {
        Arc::new(
            StaticTopology::new()
                .with_host(Host::new("h1", "headnode").with_headnode(true))
                .with_host(Host::new("h2", "cn2"))
                .with_instance(ServiceInstance::new("z1", "cnapi", Some("h1".to_owned()))),
        )
    }

    fn local_only_config() -> SearchConfig {
        SearchConfig {
            local_host: Some("h1".to_owned()),
            ..SearchConfig::default()
        }
    }

    #[tokio::test]
    async fn plan_rejects_unknown_source_before_io() {
        let ctx = SearchContext::new(
            topology(),
            Arc::new(EmptyLocal),
            Some(Arc::new(EmptyRemote)),
            SourceRegistry::builtin(),
            SearchConfig::default(),
        )
        .unwrap();
        let req = SearchRequest::new(now() - Duration::hours(1), now())
            .with_sources(vec!["bogus".to_owned()]);
        let err = ctx.plan(&req).await.unwrap_err();
        assert!(matches!(err, SearchError::UnknownSource(_)));
    }

    #[tokio::test]
    async fn plan_rejects_excessive_range() {
        let ctx = SearchContext::new(
            topology(),
            Arc::new(EmptyLocal),
            Some(Arc::new(EmptyRemote)),
            SourceRegistry::builtin(),
            SearchConfig::default(),
        )
        .unwrap();
        let req = SearchRequest::new(now() - Duration::days(8), now());
        let err = ctx.plan(&req).await.unwrap_err();
        assert_eq!(err.to_string(), "time range, 8d, is too large (>7d)");
    }

    #[tokio::test]
    async fn plan_detects_missing_remote_executor() {
        let ctx: SearchContext<_, _, NoRemote> = SearchContext::new(
            topology(),
            Arc::new(EmptyLocal),
            None,
            SourceRegistry::builtin(),
            local_only_config(),
        )
        .unwrap();
        let req = SearchRequest::new(now() - Duration::hours(1), now())
            .with_sources(vec!["vm-agent".to_owned()]);
        let err = ctx.plan(&req).await.unwrap_err();
        assert!(matches!(err, SearchError::RemoteUnavailable { count: 1 }));
    }

    #[tokio::test]
    async fn plan_local_only_when_targets_are_local() {
        let ctx: SearchContext<_, _, NoRemote> = SearchContext::new(
            topology(),
            Arc::new(EmptyLocal),
            None,
            SourceRegistry::builtin(),
            local_only_config(),
        )
        .unwrap();
        let req = SearchRequest::new(now() - Duration::minutes(90), now())
            .with_sources(vec!["cnapi".to_owned()])
            .with_hosts(vec!["headnode".to_owned()]);
        let plan = ctx.plan(&req).await.unwrap();
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.remote_targets(), 0);
        assert_eq!(plan.window.buckets().len(), 3);
        assert_eq!(plan.host_count(), 1);
    }

    #[tokio::test]
    async fn plan_rejects_bad_filters() {
        let ctx = SearchContext::new(
            topology(),
            Arc::new(EmptyLocal),
            Some(Arc::new(EmptyRemote)),
            SourceRegistry::builtin(),
            SearchConfig::default(),
        )
        .unwrap();
        let req = SearchRequest::new(now() - Duration::hours(1), now()).with_filters(vec![]);
        assert!(matches!(ctx.plan(&req).await, Err(SearchError::NoFilters)));
    }

    #[tokio::test]
    async fn empty_trace_event_search_writes_empty_array() {
        let ctx = SearchContext::new(
            topology(),
            Arc::new(EmptyLocal),
            Some(Arc::new(EmptyRemote)),
            SourceRegistry::builtin(),
            SearchConfig::default(),
        )
        .unwrap();
        let req = SearchRequest::new(now() - Duration::hours(1), now())
            .with_output(OutputMode::TraceEvent);
        let mut out = Vec::new();
        let summary = ctx.search_events(&req, &mut out).await.unwrap();
        assert_eq!(out, b"[]\n");
        assert_eq!(summary.hits, 0);
        assert_eq!(summary.buckets, 2);
    }

    #[tokio::test]
    async fn write_failure_stops_in_flight_searches() {
        let ctx = SearchContext::new(
            topology(),
            Arc::new(EmptyLocal),
            Some(Arc::new(StallingRemote)),
            SourceRegistry::builtin(),
            SearchConfig::default(),
        )
        .unwrap();
        let req = SearchRequest::new(now() - Duration::hours(1), now())
            .with_sources(vec!["vm-agent".to_owned()]);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            ctx.search_events(&req, &mut BrokenWriter),
        )
        .await
        .expect("search must stop once the writer fails");
        assert!(matches!(result, Err(SearchError::Output(e)) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn context_rejects_invalid_config() {
        let config = SearchConfig {
            concurrency: 0,
            ..SearchConfig::default()
        };
        let result: Result<SearchContext<StaticTopology, EmptyLocal, EmptyRemote>, _> =
            SearchContext::new(
                topology(),
                Arc::new(EmptyLocal),
                None,
                SourceRegistry::builtin(),
                config,
            );
        assert!(result.is_err());
    }
}
