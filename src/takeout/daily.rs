//! Per-day files with one row per 15 minute interval.

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::path::Path;
use tracing::info;

use crate::analyzers::aggregate::aggregate_batch;
use crate::analyzers::bucket::TimeUnit;
use crate::analyzers::reduction::Reduction;
use crate::analyzers::table::ResultTable;
use crate::error::Result;
use crate::parser::{parse_date, parse_time_on};
use crate::record::RecordBatch;
use crate::takeout::overview::METRICS_SCHEMA;
use crate::takeout::{CenterLabel, DAILY_FOLDER, Takeout, cell, read_metrics_csv};

/// Interval metrics of one day, from `Daily activity metrics/<YYYY-MM-DD>.csv`.
#[derive(Debug, Clone)]
pub struct DailyMetrics {
    date: NaiveDate,
    batch: RecordBatch,
}

impl DailyMetrics {
    /// Loads the intervals of `date` (`YYYY-MM-DD` or `DD-MM-YYYY`).
    ///
    /// Each interval's timestamp is placed according to `label`.
    #[tracing::instrument(skip(path, tz), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, date: &str, tz: Tz, label: CenterLabel) -> Result<Self> {
        let date = parse_date(date)?;
        let takeout = Takeout::open(path)?;
        let inner = format!("{DAILY_FOLDER}{}.csv", date.format("%Y-%m-%d"));
        let data = takeout.read_bytes(&inner)?;
        let source_name = format!("{}:{}", takeout.name(), inner);
        let daily = Self::from_csv(&data, &source_name, date, tz, label)?;

        info!(
            intervals = daily.batch.len(),
            skipped = daily.batch.skipped,
            "Loaded daily intervals"
        );
        Ok(daily)
    }

    /// Parses interval CSV data for `date`; `Start time` and `End time`
    /// look like `08:15:00.000+01:00`.
    pub fn from_csv(
        data: impl AsRef<[u8]>,
        source_name: &str,
        date: NaiveDate,
        tz: Tz,
        label: CenterLabel,
    ) -> Result<Self> {
        let batch = read_metrics_csv(data.as_ref(), source_name, &METRICS_SCHEMA, |headers, row| {
            let start = parse_time_on(date, cell(headers, row, "Start time")?, tz)?;
            let end = parse_time_on(date, cell(headers, row, "End time")?, tz)?;
            Some(label.pick(start, end))
        })?;
        Ok(Self { date, batch })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn records(&self) -> &RecordBatch {
        &self.batch
    }

    /// Reduces the requested fields per `unit` bucket within the day.
    ///
    /// `Day` gives a single row, `Hour` one row per hour, `Asis` one row per interval.
    #[tracing::instrument(skip(self, fields), fields(date = %self.date, fields = fields.len()))]
    pub fn get_variables_per_time<S: AsRef<str>>(
        &self,
        fields: &[S],
        unit: TimeUnit,
        reduction: Reduction,
    ) -> Result<ResultTable> {
        let fields = METRICS_SCHEMA.resolve_all(fields)?;
        Ok(aggregate_batch(&self.batch, &fields, unit, reduction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::bucket::BucketKey;
    use chrono::{DateTime, Timelike};

    const CSV: &str = "\
Start time,End time,Move Minutes count,Distance (m),Step count
08:00:00.000+01:00,08:15:00.000+01:00,5,400.0,600
08:15:00.000+01:00,08:30:00.000+01:00,10,800.0,1100
09:00:00.000+01:00,09:15:00.000+01:00,,698.0,900
bad,09:30:00.000+01:00,3,100.0,50
";

    fn daily(label: CenterLabel) -> DailyMetrics {
        let date = NaiveDate::from_ymd_opt(2015, 2, 3).unwrap();
        DailyMetrics::from_csv(CSV, "test", date, chrono_tz::Europe::Madrid, label).unwrap()
    }

    #[test]
    fn test_bad_time_is_skipped() {
        let d = daily(CenterLabel::Center);
        assert_eq!(d.records().len(), 3);
        assert_eq!(d.records().skipped, 1);
    }

    #[test]
    fn test_center_point() {
        let d = daily(CenterLabel::Center);
        let first = &d.records().records[0];
        assert_eq!(first.timestamp.hour(), 8);
        assert_eq!(first.timestamp.minute(), 7);
        assert_eq!(first.timestamp.second(), 30);

        let d = daily(CenterLabel::Right);
        assert_eq!(d.records().records[0].timestamp.minute(), 15);
    }

    #[test]
    fn test_whole_day_sum() {
        let table = daily(CenterLabel::Center)
            .get_variables_per_time(&["min", "dis"], TimeUnit::Day, Reduction::Sum)
            .unwrap();
        assert_eq!(table.len(), 1);
        let day = BucketKey::Day(NaiveDate::from_ymd_opt(2015, 2, 3).unwrap());
        assert_eq!(table.number(&day, "min"), Some(15.0));
        assert_eq!(table.number(&day, "dis"), Some(1898.0));
        assert_eq!(table.skipped(), 1);
    }

    #[test]
    fn test_per_hour_sum() {
        let table = daily(CenterLabel::Left)
            .get_variables_per_time(&["sc"], TimeUnit::Hour, Reduction::Sum)
            .unwrap();
        assert_eq!(table.number(&BucketKey::Hour(8), "sc"), Some(1700.0));
        assert_eq!(table.number(&BucketKey::Hour(9), "sc"), Some(900.0));
    }

    #[test]
    fn test_asis_keeps_every_interval() {
        let table = daily(CenterLabel::Left)
            .get_variables_per_time(&["Distance (m)"], TimeUnit::Asis, Reduction::First)
            .unwrap();
        assert_eq!(table.len(), 3);
        let t = DateTime::parse_from_rfc3339("2015-02-03T08:15:00+01:00").unwrap();
        assert_eq!(table.number(&BucketKey::Time(t), "dis"), Some(800.0));
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let err = DailyMetrics::open(
            "/nonexistent.zip",
            "2015-13-45",
            chrono_tz::Europe::Madrid,
            CenterLabel::Center,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::FitError::InvalidDate(_)));
    }
}
