//! 시간 윈도우 스케줄링 -- 검색 범위를 시간 버킷으로 분할합니다.
//!
//! 로테이션 파일은 담고 있는 레코드의 *다음* 시각으로 이름이 붙습니다.
//! 예를 들어 2015-02-13T20:15:03의 레코드는 `<name>_*_2015-02-13T21:*.log`에
//! 들어 있습니다. 따라서 각 버킷 라벨은 한 시간 앞당겨 계산합니다.
//!
//! 버킷은 항상 [`SearchWindow::buckets`] 순서대로 처리됩니다. 한 버킷을 완전히
//! 수집하고 정렬한 뒤에야 다음 버킷을 시작하므로, 호스트 간 시계 오차가
//! 버킷 크기(1시간) 이내라면 전체 출력이 시간 순서를 유지합니다.

use std::fmt;

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::error::SearchError;

/// 아직 로테이션되지 않은 현재 로그를 나타내는 라벨
pub const CURRENT_LABEL: &str = "current";

/// 시간 버킷
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeBucket {
    /// 로테이션된 한 시간 분량 (`YYYY-MM-DDTHH:` 라벨)
    Hour(String),
    /// 현재 열려 있는 로그
    Current,
}

impl TimeBucket {
    /// 시각이 속한 로테이션 파일의 시간 버킷을 생성합니다.
    ///
    /// `at`을 한 시간 앞당긴 뒤 시 단위로 자른 ISO-8601 접두어를 라벨로 사용합니다.
    pub fn rotated_after(at: DateTime<Utc>) -> Self {
        Self::Hour((at + Duration::hours(1)).format("%Y-%m-%dT%H:").to_string())
    }

    /// 버킷 라벨을 반환합니다.
    pub fn label(&self) -> &str {
        match self {
            Self::Hour(label) => label,
            Self::Current => CURRENT_LABEL,
        }
    }

    /// 현재 로그 버킷인지 확인합니다.
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Current)
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 검색 시간 윈도우
///
/// `(start, now)`로 한 번 생성되며, 버킷 순서는 이후 바뀌지 않습니다.
#[derive(Debug, Clone)]
pub struct SearchWindow {
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    buckets: Vec<TimeBucket>,
    /// `start`가 들어 있는 버킷의 인덱스
    start_bucket: usize,
}

impl SearchWindow {
    /// 검색 윈도우를 생성합니다.
    ///
    /// `floor(start, hour)`부터 한 시간씩 전진하며 버킷을 추가하고, 마지막에
    /// [`TimeBucket::Current`]를 붙입니다. 시간 버킷은 `floor(now, hour)`를 넘지
    /// 않으며, 그 개수는 `now - start`를 시간 단위로 올림한 값입니다.
    /// 예를 들어 90분 범위는 `now`의 분과 관계없이 시간 버킷 2개가 됩니다.
    pub fn new(start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let first_hour = floor_hour(start);
        let top_of_hour = floor_hour(now);
        let range = now - start;

        let mut buckets = Vec::new();
        let mut cursor = first_hour;
        while cursor <= top_of_hour && cursor - first_hour < range {
            buckets.push(TimeBucket::rotated_after(cursor));
            cursor += Duration::hours(1);
        }
        // 시작 시각의 시간이 아직 로테이션되지 않았다면 그 레코드는 현재 로그에 있음
        let start_bucket = if first_hour < top_of_hour {
            0
        } else {
            buckets.len()
        };
        buckets.push(TimeBucket::Current);

        Self {
            start,
            now,
            buckets,
            start_bucket,
        }
    }

    /// 최대 범위를 검증하며 검색 윈도우를 생성합니다.
    pub fn bounded(
        start: DateTime<Utc>,
        now: DateTime<Utc>,
        max_range: Duration,
    ) -> Result<Self, SearchError> {
        let range = now - start;
        if range > max_range {
            return Err(SearchError::TimeRangeTooLarge {
                range: human_duration(range),
                max: human_duration(max_range),
            });
        }
        Ok(Self::new(start, now))
    }

    /// 검색 시작 시각을 반환합니다.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// 윈도우 생성 기준 시각을 반환합니다.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// 처리 순서대로 정렬된 버킷 목록을 반환합니다.
    pub fn buckets(&self) -> &[TimeBucket] {
        &self.buckets
    }

    /// 버킷 인덱스에 적용할 시작 시각 컷오프를 반환합니다.
    ///
    /// 검색 시작 시각을 포함하는 버킷에만 적용됩니다. 보통 첫 번째 버킷이며,
    /// `start`가 `now`와 같은 시간에 있으면 [`TimeBucket::Current`]입니다.
    pub fn cutoff_for(&self, index: usize) -> Option<DateTime<Utc>> {
        (index == self.start_bucket).then_some(self.start)
    }
}

fn floor_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::hours(1)).unwrap_or(at)
}

/// 기간을 사람이 읽기 쉬운 형식으로 변환합니다.
///
/// 가장 큰 두 단위까지만 표시합니다 (예: `1h30m`, `8d`, `250ms`).
pub fn human_duration(duration: Duration) -> String {
    let mut n = duration.num_milliseconds().max(0);
    if n == 0 {
        return "0ms".to_owned();
    }

    const SIZES: [(&str, i64); 4] = [("ms", 1000), ("s", 60), ("m", 60), ("h", 24)];
    let mut bits: Vec<String> = Vec::new();
    for (idx, (unit, size)) in SIZES.iter().enumerate() {
        let remainder = n % size;
        bits.insert(
            0,
            if remainder == 0 {
                String::new()
            } else {
                format!("{remainder}{unit}")
            },
        );
        n /= size;
        if n == 0 {
            break;
        }
        if idx == SIZES.len() - 1 {
            bits.insert(0, format!("{n}d"));
            break;
        }
    }
    bits.into_iter().take(2).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 2, 13, h, m, 0).unwrap()
    }

    #[test]
    fn bucket_label_is_offset_one_hour() {
        let bucket = TimeBucket::rotated_after(at(20, 15));
        assert_eq!(bucket.label(), "2015-02-13T21:");
    }

    #[test]
    fn bucket_label_rolls_over_day() {
        let bucket = TimeBucket::rotated_after(Utc.with_ymd_and_hms(2015, 2, 13, 23, 59, 59).unwrap());
        assert_eq!(bucket.label(), "2015-02-14T00:");
    }

    fn labels(window: &SearchWindow) -> Vec<&str> {
        window.buckets().iter().map(TimeBucket::label).collect()
    }

    #[test]
    fn ninety_minutes_ago_yields_two_hours_plus_current() {
        for minute in 0..60 {
            for second in [0, 1, 30, 59] {
                let now = Utc.with_ymd_and_hms(2015, 2, 13, 12, minute, second).unwrap();
                let window = SearchWindow::new(now - Duration::minutes(90), now);
                let labels = labels(&window);
                assert_eq!(labels.len(), 3, "now = {now}: {labels:?}");
                assert!(window.buckets()[2].is_current());
                assert!(labels[0] < labels[1], "buckets must ascend: {labels:?}");
            }
        }
    }

    #[test]
    fn late_in_hour_the_start_hour_is_searched() {
        // 11:29 ~ 12:00 은 12시 파일에, 12:00 이후는 13시 파일 또는 현재 로그에 있음
        let now = at(12, 59);
        let window = SearchWindow::new(now - Duration::minutes(90), now);
        assert_eq!(
            labels(&window),
            vec!["2015-02-13T12:", "2015-02-13T13:", "current"]
        );
        assert_eq!(window.cutoff_for(0), Some(at(11, 29)));
    }

    #[test]
    fn window_labels_for_known_range() {
        let window = SearchWindow::new(at(10, 45), at(12, 15));
        assert_eq!(
            labels(&window),
            vec!["2015-02-13T11:", "2015-02-13T12:", "current"]
        );
    }

    #[test]
    fn start_within_current_hour_cuts_off_current() {
        let window = SearchWindow::new(at(12, 5), at(12, 15));
        assert_eq!(labels(&window), vec!["2015-02-13T13:", "current"]);
        assert_eq!(window.cutoff_for(0), None);
        assert_eq!(window.cutoff_for(1), Some(at(12, 5)));
    }

    #[test]
    fn start_equal_to_now_yields_only_current() {
        let window = SearchWindow::new(at(12, 5), at(12, 5));
        assert_eq!(window.buckets(), &[TimeBucket::Current]);
        assert_eq!(window.cutoff_for(0), Some(at(12, 5)));
    }

    #[test]
    fn start_on_hour_boundary_includes_that_hour() {
        let window = SearchWindow::new(at(12, 0), at(12, 15));
        assert_eq!(labels(&window), vec!["2015-02-13T13:", "current"]);
    }

    #[test]
    fn cutoff_only_applies_to_first_bucket() {
        let window = SearchWindow::new(at(9, 30), at(12, 15));
        assert_eq!(window.cutoff_for(0), Some(at(9, 30)));
        for idx in 1..window.buckets().len() {
            assert_eq!(window.cutoff_for(idx), None);
        }
    }

    #[test]
    fn bounded_rejects_large_range() {
        let now = at(12, 0);
        let err = SearchWindow::bounded(now - Duration::days(8), now, Duration::days(7)).unwrap_err();
        assert_eq!(err.to_string(), "time range, 8d, is too large (>7d)");
    }

    #[test]
    fn bounded_accepts_range_within_limit() {
        let now = at(12, 0);
        let window = SearchWindow::bounded(now - Duration::hours(1), now, Duration::days(7)).unwrap();
        assert_eq!(window.buckets().len(), 2);
    }

    proptest! {
        #[test]
        fn every_elapsed_hour_is_covered(
            start_secs in 0i64..(7 * 24 * 3600),
            range_secs in 0i64..(3 * 24 * 3600),
        ) {
            let start = at(0, 0) + Duration::seconds(start_secs);
            let now = start + Duration::seconds(range_secs);
            let window = SearchWindow::new(start, now);
            let buckets = window.buckets();

            prop_assert!(buckets.last().is_some_and(TimeBucket::is_current));
            let hours = &buckets[..buckets.len() - 1];
            let expected = (range_secs + 3599) / 3600;
            prop_assert_eq!(hours.len() as i64, expected);
            for pair in hours.windows(2) {
                prop_assert!(pair[0].label() < pair[1].label());
            }
            // start ~ floor(now) 사이의 모든 시각은 로테이션된 버킷 중 하나에 있어야 함
            let mut hour = floor_hour(start);
            while hour < floor_hour(now) {
                let bucket = TimeBucket::rotated_after(hour);
                prop_assert!(hours.contains(&bucket), "missing {} in {:?}", bucket, hours);
                hour += Duration::hours(1);
            }
            prop_assert_eq!(
                (0..buckets.len()).filter(|idx| window.cutoff_for(*idx).is_some()).count(),
                1
            );
        }
    }

    #[test]
    fn human_duration_formats() {
        assert_eq!(human_duration(Duration::zero()), "0ms");
        assert_eq!(human_duration(Duration::milliseconds(250)), "250ms");
        assert_eq!(human_duration(Duration::minutes(90)), "1h30m");
        assert_eq!(human_duration(Duration::hours(2)), "2h");
        assert_eq!(human_duration(Duration::days(8)), "8d");
        assert_eq!(
            human_duration(Duration::days(1) + Duration::hours(3) + Duration::seconds(5)),
            "1d3h"
        );
    }
}
