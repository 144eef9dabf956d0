//! Pure utility helpers shared across the workspace.
//!
//! No side effects and no I/O; only chrono for datetime parsing.

use chrono::{DateTime, Utc};

/// Parses an RFC3339 timestamp string, returning an error if parsing fails.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Parses an RFC3339 timestamp string, falling back to the provided default.
///
/// Useful for database fields that should have a valid timestamp even if
/// the stored value is malformed. Pair with a clock port for testability:
///
/// ```ignore
/// parse_datetime_or(&timestamp_str, self.clock.now())
/// ```
pub fn parse_datetime_or(s: &str, default: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(default)
}

/// Converts an empty `String` to `None`, otherwise returns `Some(value)`.
///
/// Databases store absent optional text as empty strings in places; this
/// normalises them back on the way out.
pub fn some_if_not_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn parse_datetime_valid() {
        let dt = parse_datetime("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 1);
    }

    #[test]
    fn parse_datetime_invalid() {
        assert!(parse_datetime("not-a-date").is_err());
        assert!(parse_datetime("").is_err());
    }

    #[test]
    fn parse_datetime_or_falls_back() {
        let default = Utc.with_ymd_and_hms(2020, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(parse_datetime_or("invalid", default), default);
        let dt = parse_datetime_or("2024-01-15T10:30:00Z", default);
        assert_eq!(dt.year(), 2024);
    }

    #[test]
    fn some_if_not_empty_normalises() {
        assert_eq!(some_if_not_empty(String::new()), None);
        assert_eq!(
            some_if_not_empty("mesh/part.glb".to_string()),
            Some("mesh/part.glb".to_string())
        );
    }
}
