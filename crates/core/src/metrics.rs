//! 메트릭 상수 및 설명 등록
//!
//! 검색 엔진이 기록하는 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `evtrace_search_`
//! - 접미어: `_total` (counter)
//!
//! 레코더가 설치되지 않은 경우 모든 호출은 no-op입니다.

use metrics::describe_counter;

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 실행 모드 레이블 키 (local, remote)
pub const LABEL_MODE: &str = "mode";

/// 로그 소스 레이블 키
pub const LABEL_SOURCE: &str = "source";

/// 스킵 사유 레이블 키 (malformed_json, no_timestamp, filtered)
pub const LABEL_REASON: &str = "reason";

// ─── Search 메트릭 ─────────────────────────────────────────────────

/// 정렬 후 downstream으로 내보낸 히트 수 (counter)
pub const SEARCH_HITS_TOTAL: &str = "evtrace_search_hits_total";

/// 파싱/필터 단계에서 버려진 출력 라인 수 (counter, label: reason)
pub const SEARCH_LINES_SKIPPED_TOTAL: &str = "evtrace_search_lines_skipped_total";

/// 타겟별 검색 실행 수 (counter, label: mode)
pub const SEARCH_DISPATCH_TOTAL: &str = "evtrace_search_dispatch_total";

/// 실패한 타겟 검색 수 (counter, labels: mode, source)
pub const SEARCH_DISPATCH_FAILURES_TOTAL: &str = "evtrace_search_dispatch_failures_total";

/// 처리 완료된 시간 버킷 수 (counter)
pub const SEARCH_BUCKETS_TOTAL: &str = "evtrace_search_buckets_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    describe_counter!(
        SEARCH_HITS_TOTAL,
        "Number of matched records emitted in chronological order"
    );
    describe_counter!(
        SEARCH_LINES_SKIPPED_TOTAL,
        "Number of output lines dropped before becoming hits"
    );
    describe_counter!(
        SEARCH_DISPATCH_TOTAL,
        "Number of per-target searches dispatched"
    );
    describe_counter!(
        SEARCH_DISPATCH_FAILURES_TOTAL,
        "Number of per-target searches that failed"
    );
    describe_counter!(SEARCH_BUCKETS_TOTAL, "Number of time buckets fully processed");
}
