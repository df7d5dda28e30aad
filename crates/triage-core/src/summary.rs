use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub const SUMMARY_START_TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p UTC";
pub const COMPACT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryTimeError {
    #[error("summary has no problem start time")]
    Missing,
    #[error("unparseable problem start time {raw:?}: {reason}")]
    Malformed { raw: String, reason: String },
}

fn start_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{1,2}/\d{1,2}/\d{4}\s\d{1,2}:\d{2}:\d{2}\s[AP]M\sUTC)")
            .expect("valid regex")
    })
}

/// Extracts the customer-reported problem start time embedded in an incident
/// summary (`M/D/YYYY H:MM:SS AM UTC`). Only the first candidate is considered.
pub fn parse_summary_start_time(summary: &str) -> Result<DateTime<Utc>, SummaryTimeError> {
    let Some(raw) = start_time_pattern()
        .captures(summary)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str())
    else {
        return Err(SummaryTimeError::Missing);
    };

    NaiveDateTime::parse_from_str(raw, SUMMARY_START_TIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|err| SummaryTimeError::Malformed {
            raw: raw.to_string(),
            reason: err.to_string(),
        })
}

pub fn format_compact_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(COMPACT_TIMESTAMP_FORMAT).to_string()
}

/// Accepts RFC 3339, the compact output format, or the summary format.
pub fn parse_flexible_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in [COMPACT_TIMESTAMP_FORMAT, SUMMARY_START_TIME_FORMAT] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

pub mod compact_timestamp {
    use super::{format_compact_timestamp, parse_flexible_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_compact_timestamp(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_flexible_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
