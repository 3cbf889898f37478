//! 팬아웃 병합기 -- 한 버킷의 타겟 검색을 병렬 실행하고 시간순으로 내보냄
//!
//! # 동작
//! 1. 모든 타겟 검색을 [`JoinSet`]에 생성하고, [`Semaphore`]로 동시 실행 수를 제한
//! 2. 완료 순서대로 히트를 수집 (도착 순서)
//! 3. 하나라도 실패하면 나머지 검색을 취소하고 에러 반환 (부분 버킷 없음)
//! 4. 첫 버킷이면 시작 시각 이전 히트를 제거
//! 5. 타임스탬프 기준 안정 정렬 후 bounded 채널로 하나씩 전송
//!
//! 채널이 가득 차면 `send().await`에서 대기합니다. 히트는 절대 버려지지 않습니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use evtrace_core::metrics as m;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, Hit};
use crate::error::SearchError;
use crate::exec::{LocalExecutor, RemoteExecutor};
use crate::filter::FilterChain;
use crate::target::SearchTarget;
use crate::window::TimeBucket;

/// 버킷 단위 팬아웃 병합기
pub struct FanOutMerger<L, R> {
    dispatcher: Dispatcher<L, R>,
    concurrency: usize,
}

impl<L: LocalExecutor, R: RemoteExecutor> FanOutMerger<L, R> {
    /// 새 병합기를 생성합니다. `concurrency`는 최소 1로 보정됩니다.
    pub fn new(dispatcher: Dispatcher<L, R>, concurrency: usize) -> Self {
        Self {
            dispatcher,
            concurrency: concurrency.max(1),
        }
    }

    /// 동시 실행 수를 반환합니다.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 한 버킷을 검색하여 정렬된 히트를 `tx`로 전송합니다.
    ///
    /// 전송한 히트 수를 반환합니다.
    ///
    /// # Errors
    /// - 타겟 검색 중 첫 번째 에러 (나머지 검색은 취소됨)
    /// - [`SearchError::Cancelled`]: `cancel` 토큰이 취소됨
    /// - [`SearchError::Channel`]: 수신 측이 닫힘
    pub async fn run(
        &self,
        targets: &[SearchTarget],
        bucket: &TimeBucket,
        chain: Arc<FilterChain>,
        cutoff: Option<DateTime<Utc>>,
        tx: &mpsc::Sender<Hit>,
        cancel: &CancellationToken,
    ) -> Result<usize, SearchError> {
        let batches = self.collect(targets, bucket, chain, cancel).await?;
        let hits = merge_bucket(batches, cutoff);

        let count = hits.len();
        for hit in hits {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                sent = tx.send(hit) => sent.map_err(|_| {
                    SearchError::Channel("output receiver closed".to_owned())
                })?,
            }
        }
        metrics::counter!(m::SEARCH_HITS_TOTAL).increment(count as u64);
        Ok(count)
    }

    async fn collect(
        &self,
        targets: &[SearchTarget],
        bucket: &TimeBucket,
        chain: Arc<FilterChain>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<Hit>>, SearchError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let bucket_cancel = cancel.child_token();
        let mut tasks: JoinSet<Result<Vec<Hit>, SearchError>> = JoinSet::new();

        for target in targets {
            let dispatcher = self.dispatcher.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = bucket_cancel.clone();
            let target = target.clone();
            let bucket = bucket.clone();
            let chain = Arc::clone(&chain);

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                    permit = semaphore.acquire_owned() => permit
                        .map_err(|_| SearchError::Channel("worker pool closed".to_owned()))?,
                };
                tokio::select! {
                    _ = cancel.cancelled() => Err(SearchError::Cancelled),
                    result = dispatcher.search(&target, &bucket, &chain) => result,
                }
            });
        }

        let mut batches = Vec::with_capacity(targets.len());
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| SearchError::Channel(format!("search task failed: {e}")))
                .and_then(|r| r);
            match result {
                Ok(hits) => batches.push(hits),
                Err(e) => {
                    warn!(bucket = %bucket, error = %e, "target search failed, aborting bucket");
                    bucket_cancel.cancel();
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        debug!(
            bucket = %bucket,
            targets = targets.len(),
            hits = batches.iter().map(Vec::len).sum::<usize>(),
            "bucket searches complete"
        );
        Ok(batches)
    }
}

/// 도착 순서대로 모인 히트 묶음을 하나의 시간순 목록으로 병합합니다.
///
/// `cutoff`보다 엄격히 이른 히트는 제거됩니다. 같은 시각의 히트는 도착 순서를 유지합니다.
pub fn merge_bucket(batches: Vec<Vec<Hit>>, cutoff: Option<DateTime<Utc>>) -> Vec<Hit> {
    let mut hits: Vec<Hit> = batches.into_iter().flatten().collect();
    if let Some(cutoff) = cutoff {
        hits.retain(|hit| hit.time >= cutoff);
    }
    hits.sort_by_key(|hit| hit.time);
    hits
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::TimeZone;
    use evtrace_core::types::{Host, HostScope};
    use proptest::prelude::*;

    use super::*;
    use crate::config::SearchConfig;
    use crate::exec::{CommandOutput, RemoteExecOutput, RemoteExecRequest};
    use crate::filter::{Filter, compile};
    use crate::source::SourceRegistry;

    fn hit(secs: i64, tag: &str) -> Hit {
        Hit {
            line: tag.to_owned(),
            record: serde_json::json!({ "tag": tag }),
            time: Utc.timestamp_opt(1_423_800_000 + secs, 0).unwrap(),
            source: "vm-agent".to_owned(),
            host: "cn1".to_owned(),
        }
    }

    /// 호스트명별로 정해진 출력을 반환하는 원격 실행기
    #[derive(Default)]
    struct MockRemote {
        outputs: Mutex<Vec<(String, RemoteExecOutput)>>,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl MockRemote {
        fn with_output(self, host: &str, stdout: &str) -> Self {
            self.outputs.lock().unwrap().push((
                host.to_owned(),
                RemoteExecOutput {
                    exit_status: 0,
                    stdout: stdout.to_owned(),
                    stderr: String::new(),
                },
            ));
            self
        }

        fn with_exit(self, host: &str, exit_status: i32) -> Self {
            self.outputs.lock().unwrap().push((
                host.to_owned(),
                RemoteExecOutput {
                    exit_status,
                    stdout: String::new(),
                    stderr: "grep: broken".to_owned(),
                },
            ));
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl RemoteExecutor for MockRemote {
        async fn exec(&self, request: &RemoteExecRequest) -> Result<RemoteExecOutput, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let outputs = self.outputs.lock().unwrap();
            Ok(outputs
                .iter()
                .find(|(h, _)| *h == request.hostname)
                .map(|(_, out)| out.clone())
                .unwrap_or_default())
        }
    }

    struct NoLocal;

    impl LocalExecutor for NoLocal {
        async fn run(&self, _command: &str) -> Result<CommandOutput, SearchError> {
            Ok(CommandOutput::default())
        }
    }

    fn targets(n: usize) -> Vec<SearchTarget> {
        let source = SourceRegistry::builtin().get("vm-agent").cloned().unwrap();
        (0..n)
            .map(|i| SearchTarget {
                source: Arc::clone(&source),
                host: Host::new(format!("h{i}"), format!("cn{i}")),
                scope: HostScope::Global,
                local: false,
            })
            .collect()
    }

    fn merger(remote: Arc<MockRemote>, concurrency: usize) -> FanOutMerger<NoLocal, MockRemote> {
        let dispatcher =
            Dispatcher::new(Arc::new(NoLocal), Some(remote), Arc::new(SearchConfig::default()));
        FanOutMerger::new(dispatcher, concurrency)
    }

    fn chain() -> Arc<FilterChain> {
        Arc::new(compile(&[Filter::exists("evt")]).unwrap())
    }

    fn line(time: &str, n: u32) -> String {
        format!(r#"{{"time":"{time}","evt":{{"name":"e{n}"}},"n":{n}}}"#)
    }

    #[test]
    fn merge_sorts_and_keeps_arrival_order_on_ties() {
        let merged = merge_bucket(
            vec![vec![hit(5, "a"), hit(1, "b")], vec![hit(5, "c"), hit(0, "d")]],
            None,
        );
        let tags: Vec<&str> = merged.iter().map(|h| h.line.as_str()).collect();
        assert_eq!(tags, vec!["d", "b", "a", "c"]);
    }

    #[test]
    fn merge_applies_cutoff_inclusively() {
        let cutoff = hit(5, "").time;
        let merged = merge_bucket(vec![vec![hit(4, "a"), hit(5, "b"), hit(6, "c")]], Some(cutoff));
        let tags: Vec<&str> = merged.iter().map(|h| h.line.as_str()).collect();
        assert_eq!(tags, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn run_merges_hosts_in_time_order() {
        let remote = MockRemote::default()
            .with_output(
                "cn0",
                &[line("2015-02-13T20:00:01Z", 1), line("2015-02-13T20:00:03Z", 3)].join("\n"),
            )
            .with_output("cn1", &line("2015-02-13T20:00:02Z", 2));
        let merger = merger(Arc::new(remote), 5);
        let (tx, mut rx) = mpsc::channel(16);

        let count = merger
            .run(&targets(2), &TimeBucket::Current, chain(), None, &tx, &CancellationToken::new())
            .await
            .unwrap();
        drop(tx);
        assert_eq!(count, 3);

        let mut order = Vec::new();
        while let Some(hit) = rx.recv().await {
            order.push(hit.record["n"].as_u64().unwrap());
        }
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn run_respects_concurrency_limit() {
        let remote = Arc::new(MockRemote::default().with_delay(Duration::from_millis(20)));
        let merger = merger(Arc::clone(&remote), 2);
        let (tx, _rx) = mpsc::channel(16);

        merger
            .run(&targets(6), &TimeBucket::Current, chain(), None, &tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(remote.calls.load(Ordering::SeqCst), 6);
        assert!(remote.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn run_aborts_bucket_on_remote_failure() {
        let remote = MockRemote::default()
            .with_output("cn0", &line("2015-02-13T20:00:01Z", 1))
            .with_exit("cn1", 2);
        let merger = merger(Arc::new(remote), 5);
        let (tx, mut rx) = mpsc::channel(16);

        let err = merger
            .run(&targets(2), &TimeBucket::Current, chain(), None, &tx, &CancellationToken::new())
            .await
            .unwrap_err();
        drop(tx);
        assert!(matches!(err, SearchError::RemoteExecFailed { host, .. } if host == "cn1"));
        // 부분 버킷은 내보내지 않음
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn run_blocks_on_full_channel_without_dropping() {
        let stdout: Vec<String> = (0..10)
            .map(|i| line(&format!("2015-02-13T20:00:{i:02}Z"), i))
            .collect();
        let remote = MockRemote::default().with_output("cn0", &stdout.join("\n"));
        let merger = merger(Arc::new(remote), 1);
        let (tx, mut rx) = mpsc::channel(1);

        let producer = async {
            let count = merger
                .run(&targets(1), &TimeBucket::Current, chain(), None, &tx, &CancellationToken::new())
                .await;
            drop(tx);
            count
        };
        let consumer = async {
            let mut got = Vec::new();
            while let Some(hit) = rx.recv().await {
                tokio::task::yield_now().await;
                got.push(hit.record["n"].as_u64().unwrap());
            }
            got
        };
        let (count, got) = tokio::join!(producer, consumer);
        assert_eq!(count.unwrap(), 10);
        assert_eq!(got, (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn run_reports_closed_receiver() {
        let remote = MockRemote::default().with_output("cn0", &line("2015-02-13T20:00:01Z", 1));
        let merger = merger(Arc::new(remote), 1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = merger
            .run(&targets(1), &TimeBucket::Current, chain(), None, &tx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Channel(_)));
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let remote = Arc::new(MockRemote::default().with_delay(Duration::from_secs(60)));
        let merger = merger(remote, 2);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = merger
            .run(&targets(3), &TimeBucket::Current, chain(), None, &tx, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
    }

    proptest! {
        #[test]
        fn merged_output_is_sorted_and_stable(
            batches in prop::collection::vec(prop::collection::vec(0i64..50, 0..20), 0..6)
        ) {
            let mut seq = 0usize;
            let batches: Vec<Vec<Hit>> = batches
                .into_iter()
                .map(|batch| {
                    batch
                        .into_iter()
                        .map(|secs| {
                            seq += 1;
                            hit(secs, &seq.to_string())
                        })
                        .collect()
                })
                .collect();
            let total: usize = batches.iter().map(Vec::len).sum();

            let merged = merge_bucket(batches, None);
            prop_assert_eq!(merged.len(), total);
            for pair in merged.windows(2) {
                prop_assert!(pair[0].time <= pair[1].time);
                if pair[0].time == pair[1].time {
                    let a: usize = pair[0].line.parse().unwrap();
                    let b: usize = pair[1].line.parse().unwrap();
                    prop_assert!(a < b);
                }
            }
        }
    }
}
