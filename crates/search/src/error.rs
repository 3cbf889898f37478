//! 검색 엔진 에러 타입
//!
//! [`SearchError`]는 검색 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<SearchError> for EvtraceError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! # 에러 분류
//! - 설정/레지스트리 오용: I/O 이전에 항상 치명적
//!   ([`UnknownSource`](SearchError::UnknownSource),
//!   [`UnsupportedRotation`](SearchError::UnsupportedRotation),
//!   [`InvalidScope`](SearchError::InvalidScope) 등)
//! - 필터 정의 오류: 컴파일 시점에 치명적
//! - 실행 오류: 진행 중인 버킷과 전체 검색을 중단
//!
//! 잘못된 JSON 라인, 타임스탬프 누락 등 레코드 단위 문제는 에러가 아니라
//! 경고 로그 후 스킵됩니다.

use evtrace_core::error::EvtraceError;

/// 검색 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// 레지스트리에 없는 소스 이름
    #[error("unknown source: \"{0}\"")]
    UnknownSource(String),

    /// 시간 버킷 검색을 지원하지 않는 로테이션 방식
    #[error("source '{source_name}' uses unsupported rotation '{rotation}' for hour buckets")]
    UnsupportedRotation {
        /// 소스 이름
        source_name: String,
        /// 로테이션 방식
        rotation: String,
    },

    /// 스코프 값 없이 조회된 비글로벌 소스
    #[error("source '{0}' is not global and requires a zone scope")]
    InvalidScope(String),

    /// 알 수 없는 필터 연산자
    #[error("unknown filter op: \"{0}\"")]
    UnknownFilterOp(String),

    /// 필터 연산자가 지원하지 않는 값
    #[error("unsupported value for filter on '{field}': {reason}")]
    UnsupportedFilterValue {
        /// 필터 필드명
        field: String,
        /// 거부 사유
        reason: String,
    },

    /// 필터가 하나도 없음
    #[error("no search filters")]
    NoFilters,

    /// 패턴이 정규식으로 컴파일되지 않음
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// 문제가 된 패턴
        pattern: String,
        /// 컴파일 실패 사유
        reason: String,
    },

    /// 토폴로지에 없는 호스트 이름
    #[error("unknown host: \"{0}\"")]
    UnknownHost(String),

    /// 검색 범위 초과
    #[error("time range, {range}, is too large (>{max})")]
    TimeRangeTooLarge {
        /// 요청된 범위 (사람이 읽는 형식)
        range: String,
        /// 허용 최대 범위 (사람이 읽는 형식)
        max: String,
    },

    /// 원격 실행이 0이 아닌 종료 코드로 끝남
    #[error("error running search on host '{host}' for source '{source_name}' (exit {exit_status}): {stderr}")]
    RemoteExecFailed {
        /// 대상 호스트
        host: String,
        /// 소스 이름
        source_name: String,
        /// 원격 종료 코드
        exit_status: i32,
        /// 원격 stderr
        stderr: String,
    },

    /// 원격 실행 전송 계층 실패 (연결, 타임아웃 등)
    #[error("remote execution on host '{host}' failed: {reason}")]
    RemoteTransport {
        /// 대상 호스트
        host: String,
        /// 실패 사유
        reason: String,
    },

    /// 원격 타겟이 있으나 원격 실행기가 구성되지 않음
    #[error("{count} search target(s) require remote execution but no remote executor is configured")]
    RemoteUnavailable {
        /// 원격 실행이 필요한 타겟 수
        count: usize,
    },

    /// 로컬 프로세스 실행 실패
    #[error("local search for source '{source_name}' failed: {reason}")]
    LocalExecFailed {
        /// 소스 이름
        source_name: String,
        /// 실패 사유
        reason: String,
    },

    /// 토폴로지 조회 실패
    #[error("topology error: {0}")]
    Topology(String),

    /// 출력 스트림 쓰기 실패
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// 출력 직렬화 실패
    #[error("render error: {0}")]
    Render(#[from] serde_json::Error),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 검색이 취소됨
    #[error("search cancelled")]
    Cancelled,

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl SearchError {
    /// 실행 단계(타겟 검색 중)에서 발생한 에러인지 확인합니다.
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self,
            Self::RemoteExecFailed { .. }
                | Self::RemoteTransport { .. }
                | Self::LocalExecFailed { .. }
        )
    }
}

impl From<SearchError> for EvtraceError {
    fn from(err: SearchError) -> Self {
        EvtraceError::Search(err.to_string())
    }
}
