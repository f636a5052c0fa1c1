//! Daily overview: one record per calendar day.

use chrono::{NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use std::path::Path;
use tracing::info;

use crate::analyzers::aggregate::aggregate_batch;
use crate::analyzers::bucket::TimeUnit;
use crate::analyzers::reduction::Reduction;
use crate::analyzers::table::ResultTable;
use crate::error::Result;
use crate::parser::{local_midnight, localize, parse_date};
use crate::record::{FieldSpec, RecordBatch, Schema};
use crate::takeout::{DAILY_FOLDER, Takeout, cell, read_metrics_csv};

pub const OVERVIEW_FILE: &str = "Daily activity metrics.csv";

/// Columns of the daily metrics files (overview and per-day intervals).
pub const METRICS_SCHEMA: Schema = Schema::new(&[
    FieldSpec {
        short: "min",
        long: "Move Minutes count",
    },
    FieldSpec {
        short: "cal",
        long: "Calories (kcal)",
    },
    FieldSpec {
        short: "dis",
        long: "Distance (m)",
    },
    FieldSpec {
        short: "hp",
        long: "Heart Points",
    },
    FieldSpec {
        short: "hm",
        long: "Heart Minutes",
    },
    FieldSpec {
        short: "hr",
        long: "Average heart rate (bpm)",
    },
    FieldSpec {
        short: "maxhr",
        long: "Max heart rate (bpm)",
    },
    FieldSpec {
        short: "minhr",
        long: "Min heart rate (bpm)",
    },
    FieldSpec {
        short: "lowlat",
        long: "Low latitude (deg)",
    },
    FieldSpec {
        short: "lowlong",
        long: "Low longitude (deg)",
    },
    FieldSpec {
        short: "hilat",
        long: "High latitude (deg)",
    },
    FieldSpec {
        short: "hilong",
        long: "High longitude (deg)",
    },
    FieldSpec {
        short: "avgspeed",
        long: "Average speed (m/s)",
    },
    FieldSpec {
        short: "maxspeed",
        long: "Max speed (m/s)",
    },
    FieldSpec {
        short: "minspeed",
        long: "Min speed (m/s)",
    },
    FieldSpec {
        short: "sc",
        long: "Step count",
    },
    FieldSpec {
        short: "avgweight",
        long: "Average weight (kg)",
    },
    FieldSpec {
        short: "maxweight",
        long: "Max weight (kg)",
    },
    FieldSpec {
        short: "minweight",
        long: "Min weight (kg)",
    },
    FieldSpec {
        short: "cycling",
        long: "Cycling duration (ms)",
    },
    FieldSpec {
        short: "inactive",
        long: "Inactive duration (ms)",
    },
    FieldSpec {
        short: "unknown",
        long: "Unknown duration (ms)",
    },
    FieldSpec {
        short: "walking",
        long: "Walking duration (ms)",
    },
    FieldSpec {
        short: "running",
        long: "Running duration (ms)",
    },
    FieldSpec {
        short: "rowing",
        long: "Rowing machine duration (ms)",
    },
    FieldSpec {
        short: "treadmill",
        long: "Treadmill running duration (ms)",
    },
    FieldSpec {
        short: "stairs",
        long: "Stair climbing duration (ms)",
    },
    FieldSpec {
        short: "treadmillwalking",
        long: "Treadmill duration (ms)",
    },
]);

/// Activity types that appear as session file suffixes.
pub const ACTIVITY_TYPES: &[&str] = &[
    "cycling",
    "inactive",
    "unknown",
    "walking",
    "running",
    "rowing_machine",
    "treadmill",
    "stairs",
    "treadmillwalking",
];

/// The `Daily activity metrics.csv` overview of a Takeout export.
#[derive(Debug, Clone)]
pub struct OverviewMetrics {
    batch: RecordBatch,
}

impl OverviewMetrics {
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, tz: Tz) -> Result<Self> {
        let takeout = Takeout::open(path)?;
        let inner = format!("{DAILY_FOLDER}{OVERVIEW_FILE}");
        let data = takeout.read_bytes(&inner)?;
        let overview = Self::from_csv(&data, &format!("{}:{}", takeout.name(), inner), tz)?;

        info!(
            days = overview.batch.len(),
            skipped = overview.batch.skipped,
            "Loaded daily overview"
        );
        Ok(overview)
    }

    /// Parses overview CSV data. Each row's `Date` becomes local midnight in `tz`.
    pub fn from_csv(data: impl AsRef<[u8]>, source_name: &str, tz: Tz) -> Result<Self> {
        let batch = read_metrics_csv(data.as_ref(), source_name, &METRICS_SCHEMA, |headers, row| {
            let raw = cell(headers, row, "Date")?;
            match parse_date(raw) {
                Ok(date) => Some(local_midnight(date, tz)),
                // some exports carry a time component
                Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| localize(naive, tz)),
            }
        })?;
        Ok(Self { batch })
    }

    pub fn columns() -> &'static [FieldSpec] {
        METRICS_SCHEMA.fields()
    }

    pub fn activity_types() -> &'static [&'static str] {
        ACTIVITY_TYPES
    }

    pub fn records(&self) -> &RecordBatch {
        &self.batch
    }

    /// Restricts the overview to days within `from..=to` (either bound optional).
    pub fn with_date_range(self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        let batch = self.batch.retain(|r| {
            let day = r.timestamp.date_naive();
            from.is_none_or(|f| day >= f) && to.is_none_or(|t| day <= t)
        });
        Self { batch }
    }

    /// The requested fields, one row per day.
    pub fn get_variables_per_day<S: AsRef<str>>(&self, fields: &[S]) -> Result<ResultTable> {
        self.get_variables_per_timeframe_with(fields, TimeUnit::Day, Reduction::First)
    }

    /// Median of each requested field per `unit` bucket over the whole export.
    pub fn get_variables_per_timeframe<S: AsRef<str>>(
        &self,
        fields: &[S],
        unit: TimeUnit,
    ) -> Result<ResultTable> {
        self.get_variables_per_timeframe_with(fields, unit, Reduction::Median)
    }

    #[tracing::instrument(skip(self, fields), fields(fields = fields.len()))]
    pub fn get_variables_per_timeframe_with<S: AsRef<str>>(
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
    use crate::error::FitError;

    const CSV: &str = "\
Date,Move Minutes count,Calories (kcal),Distance (m),Heart Points
2015-02-02,30,2000.5,1500.0,10
2015-02-03,45,2100,,12
2015-02-09,20,1900,900.5,
2016-01-04,60,2500,3000,30
";

    fn overview() -> OverviewMetrics {
        OverviewMetrics::from_csv(CSV, "test", chrono_tz::Europe::Madrid).unwrap()
    }

    #[test]
    fn test_columns_contains_short_names() {
        assert!(OverviewMetrics::columns().iter().any(|c| c.short == "dis"));
        assert!(OverviewMetrics::activity_types().contains(&"walking"));
    }

    #[test]
    fn test_weekday_mean() {
        let table = overview()
            .get_variables_per_timeframe_with(&["min"], TimeUnit::Weekday, Reduction::Mean)
            .unwrap();
        // 2015-02-02, 2015-02-09 and 2016-01-04 are Mondays
        assert_eq!(table.number(&BucketKey::Weekday(1), "min"), Some(110.0 / 3.0));
        assert_eq!(table.number(&BucketKey::Weekday(2), "min"), Some(45.0));
    }

    #[test]
    fn test_year_sum_with_long_names() {
        let table = overview()
            .get_variables_per_timeframe_with(
                &["Distance (m)", "cal"],
                TimeUnit::Year,
                Reduction::Sum,
            )
            .unwrap();
        assert_eq!(table.fields(), &["dis".to_string(), "cal".to_string()]);
        assert_eq!(table.number(&BucketKey::Year(2015), "dis"), Some(2400.5));
        assert_eq!(table.number(&BucketKey::Year(2016), "cal"), Some(2500.0));
    }

    #[test]
    fn test_default_is_median() {
        let table = overview()
            .get_variables_per_timeframe(&["min"], TimeUnit::Year)
            .unwrap();
        assert_eq!(table.reduction(), Reduction::Median);
        assert_eq!(table.number(&BucketKey::Year(2015), "min"), Some(30.0));
    }

    #[test]
    fn test_per_day() {
        let table = overview().get_variables_per_day(&["dis"]).unwrap();
        assert_eq!(table.len(), 4);
        let day = NaiveDate::from_ymd_opt(2015, 2, 3).unwrap();
        assert_eq!(table.get(&BucketKey::Day(day), "dis"), None);
    }

    #[test]
    fn test_date_range() {
        let from = NaiveDate::from_ymd_opt(2015, 2, 3);
        let to = NaiveDate::from_ymd_opt(2015, 12, 31);
        let table = overview()
            .with_date_range(from, to)
            .get_variables_per_day(&["min"])
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_row_is_skipped() {
        let mut data = b"Date,Move Minutes count\n2015-02-02,30\n".to_vec();
        data.extend_from_slice(b"2015-02-03,\xff5\n");
        data.extend_from_slice(b"2015-02-04,20\n");

        let overview = OverviewMetrics::from_csv(&data, "test", chrono_tz::Europe::Madrid).unwrap();
        assert_eq!(overview.records().len(), 2);
        assert_eq!(overview.records().skipped, 1);
    }

    #[test]
    fn test_unknown_field() {
        let err = overview()
            .get_variables_per_timeframe(&["steps"], TimeUnit::Week)
            .unwrap_err();
        assert!(matches!(err, FitError::UnknownField { .. }));
    }
}
