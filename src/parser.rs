//! Parsing of the date and time formats found in exports and API responses.

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{FitError, Result};

fn year_first() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]{4})[-./]([0-9]{2})[-./]([0-9]{2})").expect("valid regex"))
}

fn day_first() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]{2})[-./]([0-9]{2})[-./]([0-9]{4})").expect("valid regex"))
}

/// Parses a calendar date given as `YYYY-MM-DD` or `DD-MM-YYYY`.
///
/// Separators may be `-`, `.` or `/`. The date must exist in the calendar.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let date = if let Some(c) = year_first().captures(input) {
        ymd(&c[1], &c[2], &c[3])
    } else if let Some(c) = day_first().captures(input) {
        ymd(&c[3], &c[2], &c[1])
    } else {
        None
    };
    date.ok_or_else(|| FitError::InvalidDate(input.to_string()))
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

pub fn parse_dates<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<NaiveDate>> {
    inputs.iter().map(|d| parse_date(d.as_ref())).collect()
}

/// Midnight of `date` in `tz`, as a fixed-offset timestamp.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<FixedOffset> {
    localize(date.and_time(NaiveTime::MIN), tz)
}

/// Interprets a naive local time in `tz`. Ambiguous times take the earlier
/// instant; times skipped by a DST gap are read as UTC.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<FixedOffset> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.fixed_offset(),
        LocalResult::Ambiguous(earliest, _) => earliest.fixed_offset(),
        LocalResult::None => tz.from_utc_datetime(&naive).fixed_offset(),
    }
}

/// Converts an offset timestamp into `tz`.
pub fn to_zone(ts: DateTime<FixedOffset>, tz: Tz) -> DateTime<FixedOffset> {
    ts.with_timezone(&tz).fixed_offset()
}

/// Parses a time of day with offset such as `08:15:00.000+01:00` on `date`,
/// converted into `tz`.
pub fn parse_time_on(date: NaiveDate, time: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let stamp = format!("{} {}", date.format("%Y%m%d"), time.trim());
    DateTime::parse_from_str(&stamp, "%Y%m%d %H:%M:%S%.f%:z")
        .ok()
        .map(|t| to_zone(t, tz))
}

/// Parses an RFC 3339 / ISO 8601 timestamp (with offset or `Z`), converted into `tz`.
pub fn parse_timestamp(input: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let input = input.trim();
    let input = match input.strip_suffix('Z') {
        Some(rest) => format!("{rest}+00:00"),
        None => input.to_string(),
    };
    DateTime::parse_from_rfc3339(&input)
        .or_else(|_| DateTime::parse_from_str(&input, "%Y-%m-%dT%H:%M%:z"))
        .or_else(|_| DateTime::parse_from_str(&input, "%Y-%m-%d %H:%M:%S%:z"))
        .ok()
        .map(|t| to_zone(t, tz))
}

/// Parses a number that may use a decimal comma (`"12,5"`).
pub fn parse_decimal(input: &str) -> Option<f64> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_year_first() {
        let d = NaiveDate::from_ymd_opt(2015, 2, 3).unwrap();
        assert_eq!(parse_date("2015-02-03").unwrap(), d);
        assert_eq!(parse_date("2015/02/03").unwrap(), d);
        assert_eq!(parse_date("2015.02.03").unwrap(), d);
    }

    #[test]
    fn test_parse_day_first() {
        let d = NaiveDate::from_ymd_opt(2015, 2, 3).unwrap();
        assert_eq!(parse_date("03-02-2015").unwrap(), d);
        assert_eq!(parse_date("03/02/2015").unwrap(), d);
    }

    #[test]
    fn test_invalid_dates() {
        assert!(matches!(parse_date("2015-02-30"), Err(FitError::InvalidDate(_))));
        assert!(matches!(parse_date("yesterday"), Err(FitError::InvalidDate(_))));
        assert!(parse_dates(&["2023-01-04", "bad"]).is_err());
    }

    #[test]
    fn test_local_midnight_madrid() {
        let d = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
        let t = local_midnight(d, chrono_tz::Europe::Madrid);
        assert_eq!(t.to_rfc3339(), "2023-07-01T00:00:00+02:00");
    }

    #[test]
    fn test_parse_time_on_converts_zone() {
        let d = NaiveDate::from_ymd_opt(2015, 2, 3).unwrap();
        let t = parse_time_on(d, "08:15:00.000+00:00", chrono_tz::Europe::Madrid).unwrap();
        assert_eq!(t.hour(), 9);
        assert_eq!(t.offset().local_minus_utc(), 3600);
        assert!(parse_time_on(d, "garbage", chrono_tz::Europe::Madrid).is_none());
    }

    #[test]
    fn test_parse_timestamp() {
        let t = parse_timestamp("2023-01-04T11:00Z", chrono_tz::Europe::Madrid).unwrap();
        assert_eq!(t.hour(), 12);
        let t = parse_timestamp("2023-01-04 13:00:00+02:00", chrono_tz::Europe::Madrid).unwrap();
        assert_eq!(t.hour(), 12);
        assert!(parse_timestamp("not a time", chrono_tz::Europe::Madrid).is_none());
    }

    #[test]
    fn test_parse_decimal_comma() {
        assert_eq!(parse_decimal("12,5"), Some(12.5));
        assert_eq!(parse_decimal(" 3 "), Some(3.0));
        assert_eq!(parse_decimal("Ip"), None);
        assert_eq!(parse_decimal(""), None);
    }
}
