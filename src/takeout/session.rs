//! Per-session JSON files from `All sessions/`.

use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::analyzers::aggregate::aggregate_batch;
use crate::analyzers::bucket::TimeUnit;
use crate::analyzers::reduction::Reduction;
use crate::analyzers::table::ResultTable;
use crate::error::{FitError, Result};
use crate::parser::{parse_dates, parse_timestamp};
use crate::record::{FieldSpec, Record, RecordBatch, Schema};
use crate::takeout::overview::ACTIVITY_TYPES;
use crate::takeout::{SESSION_FOLDER, Takeout};

pub const SESSION_SCHEMA: Schema = Schema::new(&[
    FieldSpec {
        short: "act",
        long: "fitnessActivity",
    },
    FieldSpec {
        short: "min",
        long: "duration",
    },
    FieldSpec {
        short: "amin",
        long: "com.google.active_minutes",
    },
    FieldSpec {
        short: "cal",
        long: "com.google.calories.expended",
    },
    FieldSpec {
        short: "dis",
        long: "com.google.distance.delta",
    },
    FieldSpec {
        short: "hm",
        long: "com.google.heart_minutes.summary",
    },
    FieldSpec {
        short: "avgspeed",
        long: "com.google.speed.summary",
    },
    FieldSpec {
        short: "sc",
        long: "com.google.step_count.delta",
    },
]);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    fitness_activity: String,
    start_time: String,
    duration: Option<String>,
    #[serde(default)]
    aggregate: Vec<AggregateEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregateEntry {
    metric_name: String,
    float_value: Option<f64>,
    int_value: Option<i64>,
}

/// Sessions recorded on a set of dates, optionally limited to some activity types.
#[derive(Debug, Clone)]
pub struct SessionMetrics {
    batch: RecordBatch,
}

impl SessionMetrics {
    /// Loads every session file whose name starts with one of `dates`.
    ///
    /// `activities` must be a subset of the known activity types; an empty
    /// slice keeps all sessions.
    #[tracing::instrument(
        skip(path, dates, activities, tz),
        fields(path = %path.as_ref().display(), dates = dates.len())
    )]
    pub fn open<P: AsRef<Path>, S: AsRef<str>>(
        path: P,
        dates: &[S],
        activities: &[S],
        tz: Tz,
    ) -> Result<Self> {
        let activities = validate_activities(activities)?;
        let dates: BTreeSet<NaiveDate> = parse_dates(dates)?.into_iter().collect();
        let wanted: BTreeSet<String> = dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();

        let takeout = Takeout::open(path)?;
        let files: Vec<String> = takeout
            .list(SESSION_FOLDER)?
            .into_iter()
            .filter(|f| {
                let name = &f[SESSION_FOLDER.len()..];
                name.get(..10).is_some_and(|d| wanted.contains(d))
            })
            .filter(|f| {
                activities.is_empty()
                    || activity_of(f).is_some_and(|a| activities.iter().any(|w| w == a))
            })
            .collect();

        debug!(files = files.len(), "Selected session files");

        let mut records = Vec::with_capacity(files.len());
        let mut skipped = 0usize;
        for file in &files {
            let data = takeout.read_bytes(file)?;
            match parse_session(&data, tz) {
                Some(record) => records.push(record),
                None => {
                    warn!(file = %file, "Skipping malformed session file");
                    skipped += 1;
                }
            }
        }

        let batch = RecordBatch::new(records, skipped).ensure_usable(&takeout.name())?;
        info!(sessions = batch.len(), skipped = batch.skipped, "Loaded sessions");
        Ok(Self { batch })
    }

    /// Builds the sessions from already-read JSON documents.
    pub fn from_json<D: AsRef<[u8]>>(documents: &[D], tz: Tz) -> Result<Self> {
        let mut records = Vec::new();
        let mut skipped = 0;
        for doc in documents {
            match parse_session(doc.as_ref(), tz) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        let batch = RecordBatch::new(records, skipped).ensure_usable("sessions")?;
        Ok(Self { batch })
    }

    pub fn records(&self) -> &RecordBatch {
        &self.batch
    }

    /// Reduces the requested fields per `unit` bucket of session start times.
    #[tracing::instrument(skip(self, fields), fields(fields = fields.len()))]
    pub fn get_variables_per_time<S: AsRef<str>>(
        &self,
        fields: &[S],
        unit: TimeUnit,
        reduction: Reduction,
    ) -> Result<ResultTable> {
        let fields = SESSION_SCHEMA.resolve_all(fields)?;
        Ok(aggregate_batch(&self.batch, &fields, unit, reduction))
    }
}

fn validate_activities<S: AsRef<str>>(activities: &[S]) -> Result<Vec<String>> {
    activities
        .iter()
        .map(|a| {
            let a = a.as_ref().to_ascii_lowercase();
            if ACTIVITY_TYPES.contains(&a.as_str()) {
                Ok(a)
            } else {
                Err(FitError::UnknownActivity(a))
            }
        })
        .collect()
}

/// `..._WALKING.json` -> `walking`, `..._ROWING_MACHINE.json` -> `rowing_machine`.
///
/// Only known activity types are recognised; the longest matching suffix wins.
fn activity_of(file: &str) -> Option<&'static str> {
    let stem = file.strip_suffix(".json")?.to_ascii_lowercase();
    ACTIVITY_TYPES
        .iter()
        .copied()
        .filter(|act| {
            stem.strip_suffix(act)
                .is_some_and(|rest| rest.ends_with('_'))
        })
        .max_by_key(|act| act.len())
}

fn parse_session(data: &[u8], tz: Tz) -> Option<Record> {
    let session: SessionFile = serde_json::from_slice(data).ok()?;
    let start: DateTime<FixedOffset> = parse_timestamp(&session.start_time, tz)?;

    let mut record = Record::new(start).with_text("act", &session.fitness_activity);
    if let Some(seconds) = session
        .duration
        .as_deref()
        .and_then(|d| d.trim_end_matches('s').parse::<f64>().ok())
    {
        record.set_number("min", seconds / 60.0);
    }

    for entry in &session.aggregate {
        let value = match (entry.float_value, entry.int_value) {
            (Some(v), _) => v,
            (None, Some(v)) => v as f64,
            (None, None) => continue,
        };
        if let Some(spec) = SESSION_SCHEMA.by_long(&entry.metric_name) {
            record.set_number(spec.short, value);
        }
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::bucket::BucketKey;
    use crate::record::Value;

    fn session(start: &str, activity: &str, seconds: u32, steps: i64) -> String {
        format!(
            r#"{{
  "fitnessActivity": "{activity}",
  "startTime": "{start}",
  "endTime": "{start}",
  "duration": "{seconds}.000s",
  "aggregate": [
    {{ "metricName": "com.google.step_count.delta", "intValue": {steps} }},
    {{ "metricName": "com.google.distance.delta", "floatValue": 1234.5 }},
    {{ "metricName": "com.google.unrelated" , "floatValue": 1.0 }}
  ]
}}"#
        )
    }

    #[test]
    fn test_activity_of() {
        assert_eq!(
            activity_of("Takeout/Fit/All sessions/2023-10-02T08_00_00+02_00_WALKING.json"),
            Some("walking")
        );
        assert_eq!(
            activity_of("Takeout/Fit/All sessions/2023-10-02T08_00_00+02_00_ROWING_MACHINE.json"),
            Some("rowing_machine")
        );
        assert_eq!(
            activity_of("Takeout/Fit/All sessions/2023-10-02T08_00_00Z_TREADMILLWALKING.json"),
            Some("treadmillwalking")
        );
        assert_eq!(activity_of("Takeout/Fit/All sessions/2023-10-02T08_00_00Z_YOGA.json"), None);
    }

    #[test]
    fn test_validate_activities() {
        assert_eq!(validate_activities(&["Running"]).unwrap(), vec!["running".to_string()]);
        assert!(matches!(
            validate_activities(&["skydiving"]),
            Err(FitError::UnknownActivity(_))
        ));
    }

    #[test]
    fn test_parse_session_fields() {
        let doc = session("2023-10-02T06:00:00.000Z", "walking", 1800, 3500);
        let record = parse_session(doc.as_bytes(), chrono_tz::Europe::Madrid).unwrap();

        assert_eq!(record.get("act"), Some(&Value::Text("walking".to_string())));
        assert_eq!(record.number("min"), Some(30.0));
        assert_eq!(record.number("sc"), Some(3500.0));
        assert_eq!(record.number("dis"), Some(1234.5));
        assert_eq!(record.timestamp.to_rfc3339(), "2023-10-02T08:00:00+02:00");
    }

    #[test]
    fn test_sessions_per_hour() {
        let docs = vec![
            session("2023-10-02T06:00:00.000Z", "walking", 1800, 3000),
            session("2023-10-03T06:30:00.000Z", "running", 1200, 2000),
            session("2023-10-03T15:00:00.000Z", "walking", 600, 1000),
            "{ not json".to_string(),
        ];
        let sessions = SessionMetrics::from_json(&docs, chrono_tz::Europe::Madrid).unwrap();
        assert_eq!(sessions.records().skipped, 1);

        let table = sessions
            .get_variables_per_time(&["sc", "act"], TimeUnit::Hour, Reduction::Count)
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.number(&BucketKey::Hour(8), "sc"), Some(2.0));
        assert_eq!(table.number(&BucketKey::Hour(17), "act"), Some(1.0));
    }

    #[test]
    fn test_invalid_utf8_session_is_skipped() {
        let mut bad = session("2023-10-02T07:00:00.000Z", "walking", 100, 1).into_bytes();
        bad.insert(2, 0xff);
        let docs = vec![
            session("2023-10-02T06:00:00.000Z", "walking", 3000, 1).into_bytes(),
            bad,
        ];

        let sessions = SessionMetrics::from_json(&docs, chrono_tz::Europe::Madrid).unwrap();
        assert_eq!(sessions.records().len(), 1);
        assert_eq!(sessions.records().skipped, 1);
    }

    #[test]
    fn test_all_sessions_malformed() {
        let err =
            SessionMetrics::from_json(&["{}", "[]"], chrono_tz::Europe::Madrid).unwrap_err();
        assert!(matches!(err, FitError::MalformedRecord { skipped: 2, .. }));
    }
}
