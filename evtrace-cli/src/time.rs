//! `-t/--time` argument parsing
//!
//! Accepts either a duration ago (`120s`, `90m`, `2h`, `1d`) or an absolute
//! date. Dates without an offset are taken as UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::CliError;

const AGO_PATTERN: &str = r"^([1-9]\d*)([smhd])$";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a search start time relative to `now`.
///
/// # Errors
/// `CliError::Usage` when the value matches no accepted form, overflows,
/// or lies in the future.
pub fn parse_start(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CliError> {
    let value = value.trim();
    let start = match parse_ago(value)? {
        Some(ago) => now
            .checked_sub_signed(ago)
            .ok_or_else(|| usage(value, "too far in the past"))?,
        None => parse_date(value).ok_or_else(|| {
            usage(
                value,
                "expected a duration like '2h' or a date like '2015-02-13T20:15:00Z'",
            )
        })?,
    };

    if start > now {
        return Err(usage(value, "start time is in the future"));
    }
    Ok(start)
}

fn parse_ago(value: &str) -> Result<Option<Duration>, CliError> {
    let re = Regex::new(AGO_PATTERN).map_err(|e| CliError::Command(e.to_string()))?;
    let Some(caps) = re.captures(value) else {
        return Ok(None);
    };

    let count: i64 = caps[1]
        .parse()
        .map_err(|_| usage(value, "duration is too large"))?;
    let unit_secs: i64 = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => 24 * 60 * 60,
    };
    count
        .checked_mul(unit_secs)
        .and_then(Duration::try_seconds)
        .map(Some)
        .ok_or_else(|| usage(value, "duration is too large"))
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = value.strip_suffix('Z').unwrap_or(value);
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn usage(value: &str, reason: &str) -> CliError {
    CliError::Usage(format!("invalid time '{value}': {reason}"))
}
