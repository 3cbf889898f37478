//! evtrace 검색 엔진 -- 여러 호스트의 구조화 로그를 시간순으로 병합
//!
//! # 모듈 구성
//!
//! - [`source`]: 로그 소스 레지스트리와 파일 glob 생성
//! - [`filter`]: 필터 컴파일러 (연쇄 grep 패턴)
//! - [`topology`]: 함대 토폴로지 제공자 trait
//! - [`target`]: (소스, 호스트, 스코프) 검색 타겟 해석
//! - [`exec`]: 로컬 셸/원격 실행기
//! - [`dispatch`]: 타겟 하나의 한 버킷 검색
//! - [`window`]: 검색 범위의 시간 버킷 분할
//! - [`merger`]: 버킷 단위 팬아웃 검색 및 정렬 병합
//! - [`render`]: 줄 단위 JSON / trace-event 렌더러
//! - [`search`]: 전체 조합 (`search_events`)
//! - [`config`]: 검색 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! SearchWindow -> (버킷마다) FanOutMerger -> Dispatcher x N -> 정렬된 Hit -> Renderer -> bytes
//!                                  |               |
//!                          TargetResolver   Local / Remote executor
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod filter;
pub mod merger;
pub mod render;
pub mod search;
pub mod source;
pub mod target;
pub mod topology;
pub mod window;

// --- 주요 타입 re-export ---

// 검색
pub use search::{SearchContext, SearchPlan, SearchRequest, SearchSummary};

// 설정
pub use config::{SearchConfig, SearchConfigBuilder};

// 에러
pub use error::SearchError;

// 소스와 필터
pub use filter::{Filter, FilterChain, compile};
pub use source::{Rotation, Source, SourceRegistry, SourceScope};

// 타겟과 토폴로지
pub use target::{ResolveOptions, SearchTarget, resolve_targets};
pub use topology::{StaticTopology, TopologyProvider};

// 실행
pub use dispatch::{Dispatcher, Hit};
pub use exec::{
    CommandOutput, LocalExecutor, NoRemote, RemoteExecOutput, RemoteExecRequest, RemoteExecutor,
    ShellExecutor, SshExecutor,
};

// 스케줄링, 병합, 렌더링
pub use merger::FanOutMerger;
pub use render::{JsonLineRenderer, OutputMode, RenderState, Renderer, TraceEventRenderer};
pub use window::{SearchWindow, TimeBucket};
