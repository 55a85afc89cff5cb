use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};
use std::time::Duration;

use crate::common::constants::SECONDS_PER_MINUTE;

/// Truncate an instant to the start of its minute
pub fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    // with_second/with_nanosecond only fail on leap seconds, which chrono never produces here
    instant
        .with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(instant)
}

/// Start of the minute following `instant`. An instant already on a boundary
/// maps to the next boundary, never to itself.
pub fn next_minute_boundary(instant: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(instant) + TimeDelta::seconds(SECONDS_PER_MINUTE)
}

/// Time left until the next wall-clock minute boundary
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    duration_between(now, next_minute_boundary(now))
}

/// Non-negative std duration between two instants
pub fn duration_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

/// Parse an exchange-local "HH:MM" time of day
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| format!("Invalid time '{}': {}. Use HH:MM like '09:30'", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_to_minute() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 42).unwrap() + TimeDelta::milliseconds(250);
        assert_eq!(truncate_to_minute(t), Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 0).unwrap());
    }

    #[test]
    fn test_until_next_minute() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 42).unwrap();
        assert_eq!(until_next_minute(t), Duration::from_secs(18));

        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 0).unwrap();
        assert_eq!(until_next_minute(on_boundary), Duration::from_secs(60));

        let almost = on_boundary + TimeDelta::milliseconds(59_999);
        assert_eq!(until_next_minute(almost), Duration::from_millis(1));
    }

    #[test]
    fn test_duration_between_is_never_negative() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 0).unwrap();
        let b = a - TimeDelta::seconds(5);
        assert_eq!(duration_between(a, b), Duration::ZERO);
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:30").unwrap(), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(parse_hhmm(" 16:00 ").unwrap(), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert!(parse_hhmm("9h30").is_err());
        assert!(parse_hhmm("25:00").is_err());
    }
}
