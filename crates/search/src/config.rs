//! 검색 엔진 설정
//!
//! [`SearchConfig`]는 core의 [`SearchSection`](evtrace_core::config::SearchSection)과
//! [`TopologyConfig`](evtrace_core::config::TopologyConfig)에서 검색 엔진이 사용하는
//! 값만 뽑아 구성합니다.
//!
//! # 사용 예시
//! ```ignore
//! use evtrace_core::config::EvtraceConfig;
//! use evtrace_search::config::SearchConfig;
//!
//! let core_config = EvtraceConfig::default();
//! let config = SearchConfig::from_core(&core_config.search, &core_config.topology);
//! ```

use std::time::Duration;

use evtrace_core::config::{MAX_CONCURRENCY, SearchSection, TopologyConfig};
use evtrace_core::types::HostScope;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// 검색 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// 버킷 내 동시 타겟 검색 수
    pub concurrency: usize,
    /// 원격 실행 타임아웃 (초)
    pub remote_timeout_secs: u64,
    /// 최대 검색 범위 (시간)
    pub max_range_hours: u64,
    /// 병합기와 렌더러 사이 채널 용량
    pub channel_capacity: usize,
    /// grep 실행 파일
    pub grep_command: String,
    /// 타임스탬프 필드명
    pub time_field: String,
    /// 가상 호스트 제외 여부
    pub exclude_virtual_hosts: bool,
    /// 레코드 단위 재필터링 여부
    pub strict_filters: bool,
    /// 현재 호스트 UUID
    pub local_host: Option<String>,
    /// 현재 프로세스의 스코프
    pub invoking_scope: HostScope,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::from_core(&SearchSection::default(), &TopologyConfig::default())
    }
}

impl SearchConfig {
    /// core 설정 섹션에서 검색 설정을 생성합니다.
    pub fn from_core(search: &SearchSection, topology: &TopologyConfig) -> Self {
        Self {
            concurrency: search.concurrency,
            remote_timeout_secs: search.remote_timeout_secs,
            max_range_hours: search.max_range_hours,
            channel_capacity: search.channel_capacity,
            grep_command: search.grep_command.clone(),
            time_field: search.time_field.clone(),
            exclude_virtual_hosts: search.exclude_virtual_hosts,
            strict_filters: search.strict_filters,
            local_host: topology.local_host.clone(),
            invoking_scope: HostScope::from(topology.invoking_scope.as_str()),
        }
    }

    /// 원격 실행 타임아웃을 반환합니다.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// 최대 검색 범위를 반환합니다.
    pub fn max_range(&self) -> chrono::Duration {
        const MAX_HOURS: u64 = (i64::MAX / 3_600_000) as u64;
        chrono::Duration::hours(self.max_range_hours.min(MAX_HOURS) as i64)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(SearchError::Config {
                field: "concurrency".to_owned(),
                reason: format!("must be 1-{MAX_CONCURRENCY}"),
            });
        }
        if self.remote_timeout_secs == 0 {
            return Err(SearchError::Config {
                field: "remote_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.max_range_hours == 0 {
            return Err(SearchError::Config {
                field: "max_range_hours".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(SearchError::Config {
                field: "channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.grep_command.trim().is_empty() {
            return Err(SearchError::Config {
                field: "grep_command".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.time_field.is_empty() {
            return Err(SearchError::Config {
                field: "time_field".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// 검색 설정 빌더
#[derive(Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 동시 검색 수를 설정합니다.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// 원격 실행 타임아웃(초)을 설정합니다.
    pub fn remote_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote_timeout_secs = secs;
        self
    }

    /// 최대 검색 범위(시간)를 설정합니다.
    pub fn max_range_hours(mut self, hours: u64) -> Self {
        self.config.max_range_hours = hours;
        self
    }

    /// 채널 용량을 설정합니다.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// grep 실행 파일을 설정합니다.
    pub fn grep_command(mut self, grep: impl Into<String>) -> Self {
        self.config.grep_command = grep.into();
        self
    }

    /// 타임스탬프 필드명을 설정합니다.
    pub fn time_field(mut self, field: impl Into<String>) -> Self {
        self.config.time_field = field.into();
        self
    }

    /// 레코드 단위 재필터링 여부를 설정합니다.
    pub fn strict_filters(mut self, strict: bool) -> Self {
        self.config.strict_filters = strict;
        self
    }

    /// 가상 호스트 제외 여부를 설정합니다.
    pub fn exclude_virtual_hosts(mut self, exclude: bool) -> Self {
        self.config.exclude_virtual_hosts = exclude;
        self
    }

    /// 현재 호스트 UUID를 설정합니다.
    pub fn local_host(mut self, uuid: impl Into<String>) -> Self {
        self.config.local_host = Some(uuid.into());
        self
    }

    /// 현재 프로세스의 스코프를 설정합니다.
    pub fn invoking_scope(mut self, scope: HostScope) -> Self {
        self.config.invoking_scope = scope;
        self
    }

    /// 설정을 검증하고 `SearchConfig`를 생성합니다.
    pub fn build(self) -> Result<SearchConfig, SearchError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
