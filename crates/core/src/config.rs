//! 설정 관리 -- evtrace.toml 파싱 및 런타임 설정
//!
//! [`EvtraceConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`EVTRACE_SEARCH_CONCURRENCY=8` 형식)
//! 3. 설정 파일 (`evtrace.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), evtrace_core::error::EvtraceError> {
//! use evtrace_core::config::EvtraceConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = EvtraceConfig::load("evtrace.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = EvtraceConfig::parse("[search]\nconcurrency = 8")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, EvtraceError};
use crate::types::{GLOBAL_SCOPE, Host, ServiceInstance};

/// 동시 검색 작업 최대 허용치
pub const MAX_CONCURRENCY: usize = 64;

/// evtrace 통합 설정
///
/// `evtrace.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvtraceConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 검색 엔진 설정
    #[serde(default)]
    pub search: SearchSection,
    /// 정적 토폴로지 (인벤토리)
    #[serde(default)]
    pub topology: TopologyConfig,
    /// 원격 실행 설정
    #[serde(default)]
    pub remote: RemoteConfig,
    /// 기본 카탈로그에 추가할 로그 소스 정의
    #[serde(default)]
    pub sources: Vec<SourceDef>,
}

impl EvtraceConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EvtraceError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EvtraceError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EvtraceError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                EvtraceError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, EvtraceError> {
        toml::from_str(toml_str).map_err(|e| {
            EvtraceError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `EVTRACE_{SECTION}_{FIELD}`
    /// 예: `EVTRACE_SEARCH_REMOTE_TIMEOUT_SECS=60`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "EVTRACE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "EVTRACE_GENERAL_LOG_FORMAT");

        // Search
        override_usize(&mut self.search.concurrency, "EVTRACE_SEARCH_CONCURRENCY");
        override_u64(
            &mut self.search.remote_timeout_secs,
            "EVTRACE_SEARCH_REMOTE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.search.max_range_hours,
            "EVTRACE_SEARCH_MAX_RANGE_HOURS",
        );
        override_usize(
            &mut self.search.channel_capacity,
            "EVTRACE_SEARCH_CHANNEL_CAPACITY",
        );
        override_string(&mut self.search.grep_command, "EVTRACE_SEARCH_GREP_COMMAND");
        override_string(&mut self.search.shell, "EVTRACE_SEARCH_SHELL");
        override_string(&mut self.search.time_field, "EVTRACE_SEARCH_TIME_FIELD");
        override_bool(
            &mut self.search.exclude_virtual_hosts,
            "EVTRACE_SEARCH_EXCLUDE_VIRTUAL_HOSTS",
        );
        override_bool(
            &mut self.search.strict_filters,
            "EVTRACE_SEARCH_STRICT_FILTERS",
        );

        // Topology
        override_opt_string(&mut self.topology.local_host, "EVTRACE_TOPOLOGY_LOCAL_HOST");
        override_string(
            &mut self.topology.invoking_scope,
            "EVTRACE_TOPOLOGY_INVOKING_SCOPE",
        );

        // Remote
        override_bool(&mut self.remote.enabled, "EVTRACE_REMOTE_ENABLED");
        override_string(&mut self.remote.command, "EVTRACE_REMOTE_COMMAND");
        override_opt_string(&mut self.remote.user, "EVTRACE_REMOTE_USER");
        override_csv(&mut self.remote.options, "EVTRACE_REMOTE_OPTIONS");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EvtraceError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.search.concurrency == 0 || self.search.concurrency > MAX_CONCURRENCY {
            return Err(invalid(
                "search.concurrency",
                format!("must be 1-{MAX_CONCURRENCY}"),
            ));
        }

        if self.search.remote_timeout_secs == 0 {
            return Err(invalid(
                "search.remote_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.search.max_range_hours == 0 {
            return Err(invalid(
                "search.max_range_hours",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.search.channel_capacity == 0 {
            return Err(invalid(
                "search.channel_capacity",
                "must be greater than 0".to_owned(),
            ));
        }

        for (field, value) in [
            ("search.grep_command", &self.search.grep_command),
            ("search.shell", &self.search.shell),
            ("search.time_field", &self.search.time_field),
            ("topology.invoking_scope", &self.topology.invoking_scope),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty".to_owned()));
            }
        }

        if self.remote.enabled && self.remote.command.trim().is_empty() {
            return Err(invalid(
                "remote.command",
                "must not be empty when remote execution is enabled".to_owned(),
            ));
        }

        for (idx, source) in self.sources.iter().enumerate() {
            source.validate(idx)?;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> EvtraceError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 검색 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// 버킷 내 동시 타겟 검색 수
    pub concurrency: usize,
    /// 원격 실행 타임아웃 (초)
    pub remote_timeout_secs: u64,
    /// 허용되는 최대 검색 범위 (시간)
    pub max_range_hours: u64,
    /// 머저 -> 렌더러 채널 용량
    pub channel_capacity: usize,
    /// 패턴 매칭에 사용할 grep 명령
    pub grep_command: String,
    /// 파이프라인을 실행할 셸
    pub shell: String,
    /// 레코드 타임스탬프 필드명
    pub time_field: String,
    /// 가상 호스트 제외 여부
    pub exclude_virtual_hosts: bool,
    /// 파싱된 레코드를 필터 체인으로 재검증할지 여부
    pub strict_filters: bool,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            concurrency: 5,
            remote_timeout_secs: 30,
            max_range_hours: 7 * 24, // one week
            channel_capacity: 1024,
            grep_command: "/usr/bin/egrep".to_owned(),
            shell: "/bin/bash".to_owned(),
            time_field: "time".to_owned(),
            exclude_virtual_hosts: true,
            strict_filters: true,
        }
    }
}

/// 정적 토폴로지 설정
///
/// 인벤토리 서비스 대신 설정 파일에 기록된 호스트/인스턴스 목록을 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// 현재 호스트의 UUID (로컬 실행 판단에 사용)
    pub local_host: Option<String>,
    /// 현재 프로세스가 실행 중인 스코프 (`global` 또는 zone 이름)
    pub invoking_scope: String,
    /// 호스트 목록
    pub hosts: Vec<Host>,
    /// 서비스 인스턴스 목록
    pub instances: Vec<ServiceInstance>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            local_host: None,
            invoking_scope: GLOBAL_SCOPE.to_owned(),
            hosts: Vec::new(),
            instances: Vec::new(),
        }
    }
}

/// 원격 실행 설정 (ssh 기반)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 원격 접속 명령
    pub command: String,
    /// 접속 사용자
    pub user: Option<String>,
    /// 추가 명령 옵션
    pub options: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "ssh".to_owned(),
            user: None,
            options: vec!["-o".to_owned(), "BatchMode=yes".to_owned()],
        }
    }
}

/// 설정 파일에서 정의하는 로그 소스
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    /// 소스 이름 (고유)
    pub name: String,
    /// 글로벌 스코프 여부
    #[serde(default)]
    pub global: bool,
    /// 인스턴스를 찾을 서비스 이름 (기본값: 소스 이름)
    #[serde(default)]
    pub service: Option<String>,
    /// 현재 로그 경로 템플릿
    #[serde(default)]
    pub current: Option<String>,
    /// 로테이션 방식 (hourly, none)
    #[serde(default = "default_rotation")]
    pub rotation: String,
    /// 로테이션 파일 디렉토리
    #[serde(default)]
    pub rotation_dir: Option<String>,
    /// 로테이션 파일 기본 이름
    #[serde(default)]
    pub rotation_name: Option<String>,
}

fn default_rotation() -> String {
    "hourly".to_owned()
}

impl SourceDef {
    fn validate(&self, idx: usize) -> Result<(), EvtraceError> {
        if self.name.trim().is_empty() {
            return Err(invalid(
                &format!("sources[{idx}].name"),
                "must not be empty".to_owned(),
            ));
        }
        let valid_rotations = ["hourly", "none"];
        if !valid_rotations.contains(&self.rotation.as_str()) {
            return Err(invalid(
                &format!("sources[{idx}].rotation"),
                format!("must be one of: {}", valid_rotations.join(", ")),
            ));
        }
        Ok(())
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.is_empty() { None } else { Some(val) };
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
