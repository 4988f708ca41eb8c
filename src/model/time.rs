//! Timestamp parsing for values delivered by the backing store.
//!
//! Readings may arrive with or without a UTC offset depending on which path
//! produced them (poll query vs. insert notification). A value without an
//! offset is taken as UTC, never as local time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Parse a store timestamp into a UTC instant.
///
/// Accepts RFC 3339, Postgres-style `2025-01-01 08:00:00+08` and offset-less
/// ISO values (assumed UTC). Returns `None` for anything else.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Parse a form date (`YYYY-MM-DD`).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Parse a form date or full timestamp into the instant it starts at.
pub fn parse_date_or_timestamp(value: &str) -> Option<DateTime<Utc>> {
    parse_date(value)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .or_else(|| parse_timestamp(value))
}

/// Human readable age such as `42s`, `5m 3s` or `2h 10m`.
pub fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_offsetless_timestamp_is_utc() {
        let naive = parse_timestamp("2025-01-01T00:00:00").unwrap();
        let zulu = parse_timestamp("2025-01-01T00:00:00Z").unwrap();
        assert_eq!(naive, zulu);
        assert_eq!(zulu, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_offsets_are_honoured() {
        let manila = parse_timestamp("2025-01-01T08:00:00+08:00").unwrap();
        assert_eq!(manila, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        let postgres = parse_timestamp("2025-01-01 08:00:00.250+08").unwrap();
        assert_eq!(postgres.timestamp(), manila.timestamp());
        assert_eq!(postgres.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_space_separated_naive() {
        let parsed = parse_timestamp("2025-12-14 21:42:51").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 12, 14, 21, 42, 51).unwrap());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2025-13-45T99:00:00").is_none());
    }

    #[test]
    fn test_parse_date_or_timestamp() {
        let start = parse_date_or_timestamp("2025-03-01").unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        let exact = parse_date_or_timestamp("2025-03-01T12:30:00Z").unwrap();
        assert_eq!(exact, Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap());
        assert!(parse_date_or_timestamp("03/01/2025").is_none());
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(-5), "0s");
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(303), "5m 3s");
        assert_eq!(format_age(7800), "2h 10m");
        assert_eq!(format_age(90000), "1d 1h");
    }
}
