//! Time helpers: timezone strings, epoch conversion and calendar construction.

use crate::errors::DbError;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

#[must_use]
pub fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap_or_else(|| unreachable!("zero offset is always valid"))
}

/// Parses `Z`, `±HH`, `±HHMM` or `±HH:MM`.
pub fn parse_timezone(tz: &str) -> Result<FixedOffset, DbError> {
    let bad = || DbError::InvalidArgument(format!("Invalid timezone string `{tz}`"));
    if tz == "Z" || tz == "z" {
        return Ok(utc());
    }
    let (sign, rest) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(bad()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !(digits.len() == 2 || digits.len() == 4) {
        return Err(bad());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| bad())?;
    let minutes: i32 = if digits.len() == 4 { digits[2..].parse().map_err(|_| bad())? } else { 0 };
    if hours > 23 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

#[must_use]
pub fn format_timezone(offset: &FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    format!("{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

pub fn from_epoch(epoch: f64, offset: FixedOffset) -> Result<DateTime<FixedOffset>, DbError> {
    if !epoch.is_finite() {
        return Err(DbError::InvalidArgument(format!("Invalid epoch time {epoch}")));
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = (epoch * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&offset))
        .ok_or_else(|| DbError::InvalidArgument(format!("Epoch time {epoch} is out of range")))
}

/// Seconds since the Unix epoch with millisecond precision.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_epoch(t: &DateTime<FixedOffset>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

/// Builds a time from calendar components interpreted in `offset`.
#[allow(clippy::too_many_arguments)]
pub fn make_time(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: f64,
    offset: FixedOffset,
) -> Result<DateTime<FixedOffset>, DbError> {
    let bad = || {
        DbError::InvalidArgument(format!(
            "Invalid date {year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second}"
        ))
    };
    if !(0.0..61.0).contains(&second) {
        return Err(bad());
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = second.trunc() as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let millis = ((second - second.trunc()) * 1000.0).round() as u32;
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_milli_opt(hour, minute, whole, millis))
        .ok_or_else(bad)?;
    offset.from_local_datetime(&naive).single().ok_or_else(bad)
}

pub fn parse_iso8601(s: &str) -> Result<DateTime<FixedOffset>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DbError::InvalidArgument(format!("Invalid ISO 8601 time `{s}`: {e}")))
}

#[must_use]
pub fn to_iso8601(t: &DateTime<FixedOffset>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn timezone_forms() {
        assert_eq!(parse_timezone("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_timezone("-0800").unwrap().local_minus_utc(), -28_800);
        assert_eq!(parse_timezone("+02").unwrap().local_minus_utc(), 7_200);
        assert!(parse_timezone("Europe/Paris").is_err());
        assert_eq!(format_timezone(&parse_timezone("-08:00").unwrap()), "-08:00");
    }

    #[test]
    fn make_time_in_offset() {
        let tz = parse_timezone("+02:00").unwrap();
        let t = make_time(2024, 2, 29, 1, 30, 15.25, tz).unwrap();
        assert_eq!(t.hour(), 1);
        assert_eq!(t.naive_utc().hour(), 23);
        assert_eq!(t.timestamp_subsec_millis(), 250);
        assert!(make_time(2023, 2, 29, 0, 0, 0.0, tz).is_err());
    }

    #[test]
    fn epoch_round_trip() {
        let t = from_epoch(1_700_000_000.5, utc()).unwrap();
        assert!((to_epoch(&t) - 1_700_000_000.5).abs() < 1e-9);
        assert_eq!(to_iso8601(&t), "2023-11-14T22:13:20.500+00:00");
    }
}
