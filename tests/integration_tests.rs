use fit_metrics::analyzers::bucket::{BucketKey, TimeUnit};
use fit_metrics::analyzers::reduction::Reduction;
use fit_metrics::error::FitError;
use fit_metrics::takeout::{CenterLabel, DailyMetrics, OverviewMetrics, SessionMetrics};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use zip::write::SimpleFileOptions;

const MADRID: chrono_tz::Tz = chrono_tz::Europe::Madrid;

const OVERVIEW: &str = "\
Date,Move Minutes count,Calories (kcal),Distance (m),Heart Points,Step count
2023-10-02,30,2000.5,1500.0,10,3000
2023-10-03,45,2100,,12,4500
2023-10-09,20,1900,900.5,,2000
";

const DAY: &str = "\
Start time,End time,Move Minutes count,Distance (m),Step count
08:00:00.000+02:00,08:15:00.000+02:00,5,400.0,600
08:15:00.000+02:00,08:30:00.000+02:00,10,800.0,1100
09:00:00.000+02:00,09:15:00.000+02:00,15,698.0,1300
";

fn session(start: &str, activity: &str, steps: i64) -> String {
    format!(
        r#"{{"fitnessActivity": "{activity}", "startTime": "{start}", "endTime": "{start}",
            "duration": "1800.000s",
            "aggregate": [{{"metricName": "com.google.step_count.delta", "intValue": {steps}}}]}}"#
    )
}

/// A session document with a byte that is not valid UTF-8 in its activity name.
fn corrupt_session(start: &str) -> Vec<u8> {
    let mut data = session(start, "running", 2500).into_bytes();
    let at = data.iter().position(|b| *b == b'r').unwrap();
    data[at] = 0xff;
    data
}

/// Builds a Takeout-shaped zip archive under the temp dir.
fn build_takeout(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("fit_metrics_{name}.zip"));
    let _ = std::fs::remove_file(&path);

    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let files = vec![
        (
            "Takeout/Fit/Daily activity metrics/Daily activity metrics.csv".to_string(),
            OVERVIEW.as_bytes().to_vec(),
        ),
        (
            "Takeout/Fit/Daily activity metrics/2023-10-02.csv".to_string(),
            DAY.as_bytes().to_vec(),
        ),
        (
            "Takeout/Fit/All sessions/2023-10-02T08_00_00+02_00_WALKING.json".to_string(),
            session("2023-10-02T06:00:00.000Z", "walking", 3000).into_bytes(),
        ),
        (
            "Takeout/Fit/All sessions/2023-10-02T12_00_00+02_00_ROWING_MACHINE.json".to_string(),
            session("2023-10-02T10:00:00.000Z", "rowing_machine", 200).into_bytes(),
        ),
        (
            "Takeout/Fit/All sessions/2023-10-02T18_30_00+02_00_RUNNING.json".to_string(),
            session("2023-10-02T16:30:00.000Z", "running", 4000).into_bytes(),
        ),
        (
            "Takeout/Fit/All sessions/2023-10-03T08_10_00+02_00_WALKING.json".to_string(),
            session("2023-10-03T06:10:00.000Z", "walking", 1500).into_bytes(),
        ),
        (
            "Takeout/Fit/All sessions/2023-10-03T19_00_00+02_00_RUNNING.json".to_string(),
            corrupt_session("2023-10-03T17:00:00.000Z"),
        ),
        (
            "Takeout/Fit/All sessions/2023-10-04T08_10_00+02_00_WALKING.json".to_string(),
            session("2023-10-04T06:10:00.000Z", "walking", 999).into_bytes(),
        ),
    ];
    for (name, content) in files {
        zip.start_file(name, options).unwrap();
        zip.write_all(&content).unwrap();
    }
    zip.finish().unwrap();
    path
}

#[test]
fn test_overview_weekday_mean_from_zip() {
    let path = build_takeout("overview");
    let overview = OverviewMetrics::open(&path, MADRID).unwrap();

    let table = overview
        .get_variables_per_timeframe_with(&["min"], TimeUnit::Weekday, Reduction::Mean)
        .unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.number(&BucketKey::Weekday(1), "min"), Some(25.0));
    assert_eq!(table.number(&BucketKey::Weekday(2), "min"), Some(45.0));

    // missing distance on 2023-10-03 is not counted
    let table = overview
        .get_variables_per_timeframe_with(&["dis"], TimeUnit::Weekday, Reduction::Count)
        .unwrap();
    assert_eq!(table.number(&BucketKey::Weekday(2), "dis"), Some(0.0));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_daily_intervals_from_zip() {
    let path = build_takeout("daily");
    let daily = DailyMetrics::open(&path, "02-10-2023", MADRID, CenterLabel::Center).unwrap();

    let table = daily
        .get_variables_per_time(&["sc", "min"], TimeUnit::Hour, Reduction::Sum)
        .unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.number(&BucketKey::Hour(8), "sc"), Some(1700.0));
    assert_eq!(table.number(&BucketKey::Hour(9), "min"), Some(15.0));

    let err = DailyMetrics::open(&path, "2023-10-05", MADRID, CenterLabel::Center).unwrap_err();
    assert!(matches!(err, FitError::SourceUnavailable { .. }));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_sessions_filtered_by_date_and_activity() {
    let path = build_takeout("sessions");

    // the corrupt 2023-10-03 running session is skipped, not fatal
    let all = SessionMetrics::open(&path, &["2023-10-02", "2023-10-03"], &[], MADRID).unwrap();
    assert_eq!(all.records().len(), 4);
    assert_eq!(all.records().skipped, 1);

    let rowing =
        SessionMetrics::open(&path, &["2023-10-02"], &["rowing_machine"], MADRID).unwrap();
    assert_eq!(rowing.records().len(), 1);
    let table = rowing
        .get_variables_per_time(&["sc"], TimeUnit::Weekday, Reduction::Sum)
        .unwrap();
    assert_eq!(table.number(&BucketKey::Weekday(1), "sc"), Some(200.0));

    let walking =
        SessionMetrics::open(&path, &["2023-10-02", "2023-10-03"], &["walking"], MADRID).unwrap();
    let table = walking
        .get_variables_per_time(&["sc"], TimeUnit::Weekday, Reduction::Sum)
        .unwrap();
    assert_eq!(table.number(&BucketKey::Weekday(1), "sc"), Some(3000.0));
    assert_eq!(table.number(&BucketKey::Weekday(2), "sc"), Some(1500.0));

    let err = SessionMetrics::open(&path, &["2023-10-02"], &["skydiving"], MADRID).unwrap_err();
    assert!(matches!(err, FitError::UnknownActivity(_)));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_unsupported_unit() {
    let err = "Fortnight".parse::<TimeUnit>().unwrap_err();
    assert!(matches!(err, FitError::UnsupportedUnit(_)));
}

#[test]
fn test_missing_archive() {
    let err = OverviewMetrics::open("/definitely/not/here.zip", MADRID).unwrap_err();
    assert!(matches!(err, FitError::SourceUnavailable { .. }));
}
