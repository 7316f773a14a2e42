//! Date detection and parsing for temporal axes.
//!
//! Detection is two-step: a cheap regex match on the shape of the string,
//! then an actual parse, so `2024-13-45` is rejected even though it looks
//! like a date.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::Value;

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(\d{4}-\d{2}(-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?)?",
        r"|\d{4}/\d{1,2}/\d{1,2}",
        r"|\d{1,2}/\d{1,2}/\d{4})$",
    ))
    .unwrap_or_else(|err| panic!("invalid DATE_PATTERN regex: {err}"))
});

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?$")
        .unwrap_or_else(|err| panic!("invalid TIME_PATTERN regex: {err}"))
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f", // 2024-01-15T14:30:00.123
    "%Y-%m-%dT%H:%M:%S",    // 2024-01-15T14:30:00
    "%Y-%m-%dT%H:%M",       // 2024-01-15T14:30
    "%Y-%m-%d %H:%M:%S%.f", // 2024-01-15 14:30:00.123
    "%Y-%m-%d %H:%M:%S",    // 2024-01-15 14:30:00
    "%Y-%m-%d %H:%M",       // 2024-01-15 14:30
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", // 2024-01-15
    "%Y/%m/%d", // 2024/01/15
    "%m/%d/%Y", // 01/15/2024
];

/// Whether `s` has a date shape and parses as a real date.
pub fn looks_like_date(s: &str) -> bool {
    let trimmed = s.trim();
    DATE_PATTERN.is_match(trimmed) && parse_date_str(trimmed).is_some()
}

/// Whether `s` is a bare time of day (`HH:MM` or `HH:MM:SS`).
pub fn looks_like_time(s: &str) -> bool {
    let trimmed = s.trim();
    TIME_PATTERN.is_match(trimmed) && parse_time_of_day(trimmed).is_some()
}

/// Parse a date or datetime string.
///
/// RFC 3339 values with an offset are converted to UTC. `YYYY-MM` parses
/// as the first of the month.
pub fn parse_date_str(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    if let Some(stripped) = trimmed.strip_suffix('Z') {
        if let Some(dt) = parse_naive(stripped) {
            return Some(dt);
        }
    }
    parse_naive(trimmed).or_else(|| {
        // Year-month only
        if trimmed.len() == 7 {
            NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        } else {
            None
        }
    })
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a time of day.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

/// Parse a cell of a temporal field.
///
/// Strings go through [`parse_date_str`]. Integers in `1000..=9999` are
/// read as years; larger numbers as Unix timestamps in milliseconds.
pub fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => parse_date_str(s).or_else(|| {
            let trimmed = s.trim();
            if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
                year_start(trimmed.parse().ok()?)
            } else {
                None
            }
        }),
        Value::Number(n) => {
            let n = n.as_i64()?;
            if (1000..=9999).contains(&n) {
                year_start(n as i32)
            } else {
                DateTime::from_timestamp_millis(n).map(|dt| dt.naive_utc())
            }
        }
        _ => None,
    }
}

fn year_start(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Whether a cell looks like a date: a date-shaped string that parses.
pub fn is_date_value(value: &Value) -> bool {
    matches!(value, Value::String(s) if looks_like_date(s))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    use super::*;

    #[test]
    fn recognises_common_date_shapes() {
        assert!(looks_like_date("2024-01-15"));
        assert!(looks_like_date("2024-01"));
        assert!(looks_like_date("2024-01-15T14:30:00"));
        assert!(looks_like_date("2024-01-15T14:30:00Z"));
        assert!(looks_like_date("2024-01-15T14:30:00.250+02:00"));
        assert!(looks_like_date("2024-01-15 14:30"));
        assert!(looks_like_date("2024/1/5"));
        assert!(looks_like_date("01/15/2024"));
    }

    #[test]
    fn rejects_non_dates() {
        assert!(!looks_like_date("North"));
        assert!(!looks_like_date("2024"));
        assert!(!looks_like_date("12345"));
        assert!(!looks_like_date("2024-13-45"));
        assert!(!looks_like_date("2024-02-30"));
    }

    #[test]
    fn offsets_convert_to_utc() {
        let dt = parse_date_str("2024-01-15T14:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn year_month_is_first_of_month() {
        let dt = parse_date_str("2024-03").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 3, 1));
    }

    #[test]
    fn numeric_years_and_timestamps() {
        assert_eq!(parse_datetime(&json!(2021)).unwrap().year(), 2021);
        assert_eq!(parse_datetime(&json!("1999")).unwrap().year(), 1999);
        let dt = parse_datetime(&json!(1_704_067_200_000i64)).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
        assert!(parse_datetime(&json!(null)).is_none());
    }

    #[test]
    fn time_of_day() {
        assert!(looks_like_time("09:30"));
        assert!(looks_like_time("23:59:59"));
        assert!(!looks_like_time("25:00"));
        assert!(!looks_like_time("2024-01-01"));
    }
}
