//! Lenient timestamp parsing.
//!
//! The backend emits either RFC 3339 or naive ISO-8601 without an offset.
//! Naive values are UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_naive_is_utc() {
        let parsed = parse("2024-11-02T08:15:30.123456").unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.hour(), 8);
        assert_eq!(parsed.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_offset_is_normalized() {
        let parsed = parse("2024-11-02T10:15:30+02:00").unwrap();
        assert_eq!(parsed.hour(), 8);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(parse("yesterday"), None);
    }
}
