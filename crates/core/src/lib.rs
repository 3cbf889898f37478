//! evtrace 공통 타입, 에러, 설정
//!
//! 이 크레이트는 `evtrace-search` 엔진과 `evtrace` CLI가 공유하는
//! 데이터 구조를 정의합니다.
//!
//! - [`config`]: `evtrace.toml` 파싱, 환경변수 오버라이드, 유효성 검증
//! - [`error`]: 최상위 에러 타입
//! - [`types`]: 호스트, 서비스 인스턴스, 호스트 스코프
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EvtraceError};

// 설정
pub use config::EvtraceConfig;

// 도메인 타입
pub use types::{GLOBAL_SCOPE, Host, HostScope, ServiceInstance};
