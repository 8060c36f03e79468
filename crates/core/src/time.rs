use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

use crate::error::{QueryMetricsError, Result};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Numeric offsets without a colon, e.g. `+0000`.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

/// Parses a timestamp cell from a query result.
///
/// Accepts RFC 3339 strings (the format both Azure query services emit for
/// `datetime` columns), date-times with a `+hhmm` offset, and naive
/// date-times or bare dates, which are taken as UTC.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    let Some(raw) = value.as_str() else {
        return Err(QueryMetricsError::RowParse(format!(
            "timestamp must be a string, got {value}"
        )));
    };
    parse_timestamp_str(raw)
}

pub fn parse_timestamp_str(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(input, fmt) {
            return Ok(ts.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    Err(QueryMetricsError::RowParse(format!(
        "unrecognised timestamp, got {input:?}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| QueryMetricsError::Parse(format!("invalid duration {input}: {e}")))
}
