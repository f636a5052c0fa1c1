//! Mapping record timestamps to bucket keys.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::FitError;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// ISO weekday, Monday = 1 .. Sunday = 7.
    Weekday,
    /// Hour of day in the record's own offset.
    Hour,
    /// The raw timestamp is the key.
    Asis,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// Name of the key column in row exports.
    pub fn key_label(&self) -> &'static str {
        match self {
            TimeUnit::Weekday => "weekday",
            TimeUnit::Hour => "hour",
            TimeUnit::Asis => "time",
            TimeUnit::Day => "date",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }

    pub fn bucket(&self, record: &Record) -> BucketKey {
        bucket_timestamp(&record.timestamp, *self)
    }
}

impl FromStr for TimeUnit {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weekday" => Ok(TimeUnit::Weekday),
            "hour" => Ok(TimeUnit::Hour),
            "asis" => Ok(TimeUnit::Asis),
            "day" => Ok(TimeUnit::Day),
            "week" => Ok(TimeUnit::Week),
            "month" => Ok(TimeUnit::Month),
            "year" => Ok(TimeUnit::Year),
            _ => Err(FitError::UnsupportedUnit(s.to_string())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Weekday => "Weekday",
            TimeUnit::Hour => "Hour",
            TimeUnit::Asis => "Asis",
            TimeUnit::Day => "Day",
            TimeUnit::Week => "Week",
            TimeUnit::Month => "Month",
            TimeUnit::Year => "Year",
        };
        f.write_str(name)
    }
}

/// Key of one bucket. Variants order by their natural order within a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    Weekday(u8),
    Hour(u8),
    Time(DateTime<FixedOffset>),
    Day(NaiveDate),
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Year(i32),
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Weekday(d) => write!(f, "{d}"),
            BucketKey::Hour(h) => write!(f, "{h}"),
            BucketKey::Time(t) => write!(f, "{}", t.to_rfc3339()),
            BucketKey::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            BucketKey::Week { year, week } => write!(f, "{year}-W{week:02}"),
            BucketKey::Month { year, month } => write!(f, "{year}-{month:02}"),
            BucketKey::Year(y) => write!(f, "{y}"),
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BucketKey::Weekday(n) | BucketKey::Hour(n) => serializer.serialize_u8(*n),
            BucketKey::Year(y) => serializer.serialize_i32(*y),
            other => serializer.collect_str(other),
        }
    }
}

pub fn bucket_timestamp(ts: &DateTime<FixedOffset>, unit: TimeUnit) -> BucketKey {
    match unit {
        TimeUnit::Weekday => BucketKey::Weekday(ts.weekday().number_from_monday() as u8),
        TimeUnit::Hour => BucketKey::Hour(ts.hour() as u8),
        TimeUnit::Asis => BucketKey::Time(*ts),
        TimeUnit::Day => BucketKey::Day(ts.date_naive()),
        TimeUnit::Week => {
            let iso = ts.iso_week();
            BucketKey::Week {
                year: iso.year(),
                week: iso.week(),
            }
        }
        TimeUnit::Month => BucketKey::Month {
            year: ts.year(),
            month: ts.month(),
        },
        TimeUnit::Year => BucketKey::Year(ts.year()),
    }
}
