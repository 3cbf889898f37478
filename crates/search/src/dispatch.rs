//! 실행 디스패처 -- 한 타겟의 한 버킷을 검색하여 히트 목록 반환
//!
//! 타겟이 로컬 실행 가능하면 grep 파이프라인을 로컬 셸로 실행하고,
//! 그렇지 않으면 같은 파이프라인을 glob 루프 스크립트로 감싸 원격 실행기에
//! 전달합니다. 타겟당 버킷당 정확히 하나의 프로세스 또는 원격 호출이 발생합니다.
//!
//! 출력 라인 처리:
//! - 빈 라인은 무시
//! - JSON 파싱 실패 라인은 경고 후 스킵 (로테이션 경계에서 잘린 라인)
//! - 타임스탬프가 없거나 파싱되지 않는 레코드는 스킵
//! - `strict_filters`가 켜져 있으면 레코드 단위로 필터를 재검사

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use evtrace_core::metrics as m;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::exec::{LocalExecutor, RemoteExecRequest, RemoteExecutor};
use crate::filter::FilterChain;
use crate::target::SearchTarget;
use crate::window::TimeBucket;

/// grep의 "일치 없음" 종료 코드
const GREP_NO_MATCH: i32 = 1;

/// 매칭된 로그 레코드 하나
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// 원본 라인
    pub line: String,
    /// 파싱된 레코드
    pub record: Value,
    /// 레코드 타임스탬프
    pub time: DateTime<Utc>,
    /// 소스 이름
    pub source: String,
    /// 호스트명
    pub host: String,
}

/// 타겟 검색 디스패처
///
/// 로컬/원격 실행기를 소유하며 여러 태스크에서 공유됩니다.
pub struct Dispatcher<L, R> {
    local: Arc<L>,
    remote: Option<Arc<R>>,
    config: Arc<SearchConfig>,
}

impl<L, R> Clone for Dispatcher<L, R> {
    fn clone(&self) -> Self {
        Self {
            local: Arc::clone(&self.local),
            remote: self.remote.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<L: LocalExecutor, R: RemoteExecutor> Dispatcher<L, R> {
    /// 새 디스패처를 생성합니다.
    pub fn new(local: Arc<L>, remote: Option<Arc<R>>, config: Arc<SearchConfig>) -> Self {
        Self {
            local,
            remote,
            config,
        }
    }

    /// 원격 실행기가 구성되어 있는지 확인합니다.
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// 설정을 반환합니다.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// 한 타겟의 한 버킷을 검색합니다.
    ///
    /// # Errors
    /// - glob 생성 실패 ([`SearchError::InvalidScope`], [`SearchError::UnsupportedRotation`])
    /// - [`SearchError::LocalExecFailed`]: 로컬 프로세스 생성 실패
    /// - [`SearchError::RemoteExecFailed`]: 원격 스크립트가 0이 아닌 코드로 종료
    /// - [`SearchError::RemoteTransport`], [`SearchError::RemoteUnavailable`]
    pub async fn search(
        &self,
        target: &SearchTarget,
        bucket: &TimeBucket,
        chain: &FilterChain,
    ) -> Result<Vec<Hit>, SearchError> {
        let glob = target.source.resolve_glob(&target.scope, bucket)?;
        let mode = if target.local { "local" } else { "remote" };
        metrics::counter!(m::SEARCH_DISPATCH_TOTAL, m::LABEL_MODE => mode).increment(1);

        let result = if target.local {
            self.search_local(target, &glob, chain).await
        } else {
            self.search_remote(target, &glob, chain).await
        };

        match result {
            Ok(stdout) => Ok(self.parse_output(target, &stdout, chain)),
            Err(e) => {
                metrics::counter!(
                    m::SEARCH_DISPATCH_FAILURES_TOTAL,
                    m::LABEL_MODE => mode,
                    m::LABEL_SOURCE => target.source.name().to_owned()
                )
                .increment(1);
                Err(e)
            }
        }
    }

    async fn search_local(
        &self,
        target: &SearchTarget,
        glob: &str,
        chain: &FilterChain,
    ) -> Result<String, SearchError> {
        let command = chain.pipeline(&self.config.grep_command, glob);
        debug!(search_target = %target.describe(), command = %command, "local search");

        let output = self
            .local
            .run(&command)
            .await
            .map_err(|e| SearchError::LocalExecFailed {
                source_name: target.source.name().to_owned(),
                reason: e.to_string(),
            })?;

        match output.status {
            Some(0) | Some(GREP_NO_MATCH) => {}
            status => {
                // 존재하지 않는 파일 등: 나온 출력은 그대로 사용
                warn!(
                    search_target = %target.describe(),
                    status = ?status,
                    stderr = %output.stderr.trim(),
                    "local search exited abnormally"
                );
            }
        }
        Ok(output.stdout)
    }

    async fn search_remote(
        &self,
        target: &SearchTarget,
        glob: &str,
        chain: &FilterChain,
    ) -> Result<String, SearchError> {
        let remote = self
            .remote
            .as_ref()
            .ok_or(SearchError::RemoteUnavailable { count: 1 })?;

        let request = RemoteExecRequest {
            script: remote_script(&self.config.grep_command, glob, chain),
            host_uuid: target.host.uuid.clone(),
            hostname: target.host.hostname.clone(),
            timeout: self.config.remote_timeout(),
            env: HashMap::new(),
        };
        debug!(search_target = %target.describe(), glob, "remote search");

        let output = remote.exec(&request).await?;
        if output.exit_status != 0 {
            return Err(SearchError::RemoteExecFailed {
                host: target.host.hostname.clone(),
                source_name: target.source.name().to_owned(),
                exit_status: output.exit_status,
                stderr: output.stderr.trim().to_owned(),
            });
        }
        Ok(output.stdout)
    }

    fn parse_output(&self, target: &SearchTarget, stdout: &str, chain: &FilterChain) -> Vec<Hit> {
        let mut hits = Vec::new();
        for line in stdout.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let record: Value = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(search_target = %target.describe(), error = %e, line, "hit is not a JSON line, skipping");
                    skipped("malformed_json");
                    continue;
                }
            };

            let Some(time) = record_time(&record, &self.config.time_field) else {
                debug!(search_target = %target.describe(), line, "hit has no parseable timestamp, skipping");
                skipped("no_timestamp");
                continue;
            };

            if self.config.strict_filters && !chain.accepts(&record) {
                skipped("filtered");
                continue;
            }

            hits.push(Hit {
                line: line.to_owned(),
                record,
                time,
                source: target.source.name().to_owned(),
                host: target.host.hostname.clone(),
            });
        }
        hits
    }
}

fn skipped(reason: &'static str) {
    metrics::counter!(m::SEARCH_LINES_SKIPPED_TOTAL, m::LABEL_REASON => reason).increment(1);
}

/// 레코드에서 타임스탬프를 추출합니다.
///
/// RFC 3339 문자열 또는 epoch 밀리초 정수를 지원합니다.
pub fn record_time(record: &Value, field: &str) -> Option<DateTime<Utc>> {
    match record.get(field)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// 원격 호스트에서 실행할 검색 스크립트를 생성합니다.
///
/// glob이 아무 파일과도 일치하지 않거나 파일이 사라진 경우에도 성공 종료합니다.
pub fn remote_script(grep: &str, glob: &str, chain: &FilterChain) -> String {
    let pipeline = chain.pipeline(grep, "\"${file}\"");
    [
        "#!/bin/bash".to_owned(),
        String::new(),
        format!("for file in {glob}; do"),
        "    if [[ -f \"${file}\" ]]; then".to_owned(),
        format!("        {pipeline}"),
        "    fi".to_owned(),
        "done".to_owned(),
        "exit 0".to_owned(),
    ]
    .join("\n")
}
