//! Calendar-day extraction from the loose date formats the task service emits.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Calendar day of `raw`, as seen from `tz`.
///
/// Instants carrying an offset are converted into `tz` first; naive values
/// are taken to already be local to `tz`.
pub fn calendar_day<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(tz).date_naive());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.date());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Same as [`calendar_day`], also accepting epoch milliseconds.
pub fn calendar_day_of_value<Tz: TimeZone>(value: &Value, tz: &Tz) -> Option<NaiveDate> {
    match value {
        Value::String(s) => calendar_day(s, tz),
        Value::Number(n) => {
            let millis = n.as_i64()?;
            let instant = DateTime::<Utc>::from_timestamp_millis(millis)?;
            Some(instant.with_timezone(tz).date_naive())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_plain_date() {
        assert_eq!(calendar_day("2024-01-01", &Utc), Some(day(2024, 1, 1)));
    }

    #[test]
    fn test_naive_datetime_keeps_its_day() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(calendar_day("2024-03-10 23:30:00", &tz), Some(day(2024, 3, 10)));
        assert_eq!(calendar_day("2024-03-10T23:30", &tz), Some(day(2024, 3, 10)));
    }

    #[test]
    fn test_offset_instant_is_converted() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        // 20:00 UTC is 04:00 the next morning at +08:00.
        assert_eq!(calendar_day("2024-03-10T20:00:00Z", &tz), Some(day(2024, 3, 11)));
        assert_eq!(calendar_day("2024-03-10T20:00:00Z", &Utc), Some(day(2024, 3, 10)));
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(calendar_day("", &Utc), None);
        assert_eq!(calendar_day("tomorrow", &Utc), None);
        assert_eq!(calendar_day("2024-13-45", &Utc), None);
    }

    #[test]
    fn test_epoch_millis() {
        // 2024-01-01T00:00:00Z
        assert_eq!(
            calendar_day_of_value(&json!(1_704_067_200_000i64), &Utc),
            Some(day(2024, 1, 1))
        );
        assert_eq!(calendar_day_of_value(&json!(true), &Utc), None);
    }
}
