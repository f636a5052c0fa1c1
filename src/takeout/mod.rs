//! Record sources backed by a Google Fit Takeout export.
//!
//! An export is either the `.zip` archive as downloaded or the unpacked
//! directory tree. Files inside are addressed by their archive path, e.g.
//! `Takeout/Fit/Daily activity metrics/Daily activity metrics.csv`.

pub mod daily;
pub mod overview;
pub mod session;

pub use daily::DailyMetrics;
pub use overview::OverviewMetrics;
pub use session::SessionMetrics;

use chrono::{DateTime, FixedOffset};
use csv::StringRecord;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{FitError, Result};
use crate::parser::parse_decimal;
use crate::record::{Record, RecordBatch, Schema};

/// Folder holding the daily overview and the per-day interval files.
pub const DAILY_FOLDER: &str = "Takeout/Fit/Daily activity metrics/";
/// Folder holding one JSON file per recorded session.
pub const SESSION_FOLDER: &str = "Takeout/Fit/All sessions/";

#[derive(Debug, Clone)]
enum Location {
    Zip(PathBuf),
    Dir(PathBuf),
}

/// Read-only handle on a Takeout export.
#[derive(Debug, Clone)]
pub struct Takeout {
    location: Location,
}

impl Takeout {
    /// Opens a zip archive (any path whose extension contains `zip`) or a directory.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FitError::unavailable(
                path.display().to_string(),
                "no such file or directory",
            ));
        }

        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.to_ascii_lowercase().contains("zip"));

        let location = if is_zip {
            // fail early on archives that cannot be read
            let file = File::open(path)
                .map_err(|e| FitError::unavailable(path.display().to_string(), e))?;
            zip::ZipArchive::new(file)
                .map_err(|e| FitError::unavailable(path.display().to_string(), e))?;
            Location::Zip(path.to_path_buf())
        } else if path.is_dir() {
            Location::Dir(path.to_path_buf())
        } else {
            return Err(FitError::unavailable(
                path.display().to_string(),
                "expected a zip archive or an unpacked Takeout directory",
            ));
        };

        debug!(zip = is_zip, "Opened takeout");
        Ok(Self { location })
    }

    pub fn name(&self) -> String {
        match &self.location {
            Location::Zip(p) | Location::Dir(p) => p.display().to_string(),
        }
    }

    fn unavailable(&self, inner: &str, reason: impl ToString) -> FitError {
        FitError::unavailable(format!("{}:{}", self.name(), inner), reason)
    }

    /// Reads one file of the export as raw bytes.
    ///
    /// Decoding is left to the record parsers so that a bad byte only
    /// affects the record it belongs to.
    pub fn read_bytes(&self, inner: &str) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        match &self.location {
            Location::Zip(path) => {
                let file = File::open(path).map_err(|e| self.unavailable(inner, e))?;
                let mut archive =
                    zip::ZipArchive::new(file).map_err(|e| self.unavailable(inner, e))?;
                let mut entry = archive
                    .by_name(inner)
                    .map_err(|e| self.unavailable(inner, e))?;
                entry
                    .read_to_end(&mut content)
                    .map_err(|e| self.unavailable(inner, e))?;
            }
            Location::Dir(root) => {
                content = std::fs::read(root.join(inner)).map_err(|e| self.unavailable(inner, e))?;
            }
        }
        Ok(content)
    }

    /// Archive paths of the files directly below `folder`, sorted.
    pub fn list(&self, folder: &str) -> Result<Vec<String>> {
        let mut names = match &self.location {
            Location::Zip(path) => {
                let file = File::open(path).map_err(|e| self.unavailable(folder, e))?;
                let archive =
                    zip::ZipArchive::new(file).map_err(|e| self.unavailable(folder, e))?;
                archive
                    .file_names()
                    .filter(|n| {
                        n.starts_with(folder) && n.len() > folder.len() && !n.ends_with('/')
                    })
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            }
            Location::Dir(root) => {
                let mut names = Vec::new();
                let entries =
                    std::fs::read_dir(root.join(folder)).map_err(|e| self.unavailable(folder, e))?;
                for entry in entries {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        if let Some(name) = entry.file_name().to_str() {
                            names.push(format!("{folder}{name}"));
                        }
                    }
                }
                names
            }
        };
        names.sort();
        Ok(names)
    }
}

/// Where a record's timestamp lies between the start and end of its interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum CenterLabel {
    Left,
    Right,
    #[default]
    Center,
}

impl CenterLabel {
    pub fn pick(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> DateTime<FixedOffset> {
        match self {
            CenterLabel::Left => start,
            CenterLabel::Right => end,
            CenterLabel::Center => start + (end - start) / 2,
        }
    }
}

impl FromStr for CenterLabel {
    type Err = FitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(CenterLabel::Left),
            "right" => Ok(CenterLabel::Right),
            "center" | "centre" => Ok(CenterLabel::Center),
            _ => Err(FitError::InvalidLabel(s.to_string())),
        }
    }
}

pub(crate) fn cell<'a>(
    headers: &StringRecord,
    row: &'a StringRecord,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .position(|h| h == name)
        .and_then(|idx| row.get(idx))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Reads a metrics CSV whose columns follow `schema`.
///
/// `timestamp` derives each row's timestamp. Rows it rejects, rows the CSV
/// reader cannot decode (including invalid UTF-8) and rows with unparseable
/// numbers are skipped and counted.
pub(crate) fn read_metrics_csv(
    data: &[u8],
    source_name: &str,
    schema: &Schema,
    timestamp: impl Fn(&StringRecord, &StringRecord) -> Option<DateTime<FixedOffset>>,
) -> Result<RecordBatch> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);
    let headers = rdr.headers()?.clone();

    let columns: Vec<(usize, &'static str)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| schema.by_long(h.trim()).map(|spec| (idx, spec.short)))
        .collect();

    let mut records = Vec::new();
    let mut skipped = 0usize;

    'rows: for (line, result) in rdr.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                warn!(source = source_name, line, error = %e, "Skipping unreadable row");
                skipped += 1;
                continue;
            }
        };

        let Some(ts) = timestamp(&headers, &row) else {
            warn!(source = source_name, line, "Skipping row without a valid timestamp");
            skipped += 1;
            continue;
        };

        let mut record = Record::new(ts);
        for &(idx, short) in &columns {
            let Some(raw) = row.get(idx).map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            match parse_decimal(raw) {
                Some(value) => record.set_number(short, value),
                None => {
                    warn!(
                        source = source_name,
                        line,
                        field = short,
                        value = raw,
                        "Skipping row with unparseable value"
                    );
                    skipped += 1;
                    continue 'rows;
                }
            }
        }
        records.push(record);
    }

    debug!(
        source = source_name,
        records = records.len(),
        skipped,
        "Read metrics CSV"
    );
    RecordBatch::new(records, skipped).ensure_usable(source_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldSpec;

    const SCHEMA: Schema = Schema::new(&[
        FieldSpec {
            short: "min",
            long: "Move Minutes count",
        },
        FieldSpec {
            short: "cal",
            long: "Calories (kcal)",
        },
    ]);

    fn fixed_ts(_: &StringRecord, _: &StringRecord) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339("2023-10-02T00:00:00+02:00").ok()
    }

    #[test]
    fn test_center_label() {
        let start = DateTime::parse_from_rfc3339("2023-10-02T08:00:00+02:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2023-10-02T08:15:00+02:00").unwrap();
        assert_eq!(CenterLabel::Left.pick(start, end), start);
        assert_eq!(CenterLabel::Right.pick(start, end), end);
        assert_eq!(
            CenterLabel::Center.pick(start, end).to_rfc3339(),
            "2023-10-02T08:07:30+02:00"
        );
    }

    #[test]
    fn test_parse_label() {
        assert_eq!("Left".parse::<CenterLabel>().unwrap(), CenterLabel::Left);
        assert!(matches!("Middle".parse::<CenterLabel>(), Err(FitError::InvalidLabel(_))));
    }

    #[test]
    fn test_read_metrics_csv_skips_bad_rows() {
        let text = "Move Minutes count,Calories (kcal),Other\n30,1500.5,x\nabc,10,y\n,20,z\n";
        let batch = read_metrics_csv(text.as_bytes(), "test", &SCHEMA, fixed_ts).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.records[0].number("min"), Some(30.0));
        assert_eq!(batch.records[0].number("cal"), Some(1500.5));
        assert_eq!(batch.records[1].get("min"), None);
    }

    #[test]
    fn test_read_metrics_csv_all_malformed() {
        let text = "Move Minutes count\nabc\ndef\n";
        let err = read_metrics_csv(text.as_bytes(), "test", &SCHEMA, fixed_ts).unwrap_err();
        assert!(matches!(err, FitError::MalformedRecord { skipped: 2, .. }));
    }

    #[test]
    fn test_read_metrics_csv_invalid_utf8_row_is_skipped() {
        let mut data = b"Move Minutes count,Calories (kcal)\n30,1500\n".to_vec();
        data.extend_from_slice(b"4\xff,10\n");
        data.extend_from_slice(b"45,1600\n");

        let batch = read_metrics_csv(&data, "test", &SCHEMA, fixed_ts).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.records[1].number("min"), Some(45.0));
    }

    #[test]
    fn test_open_missing_path() {
        let err = Takeout::open("/definitely/not/here.zip").unwrap_err();
        assert!(matches!(err, FitError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_directory_takeout() {
        let root = std::env::temp_dir().join("fit_metrics_test_dir_takeout");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join(DAILY_FOLDER)).unwrap();
        std::fs::write(root.join(DAILY_FOLDER).join("2023-10-02.csv"), "a\n1\n").unwrap();

        let takeout = Takeout::open(&root).unwrap();
        let names = takeout.list(DAILY_FOLDER).unwrap();
        assert_eq!(names, vec![format!("{DAILY_FOLDER}2023-10-02.csv")]);
        assert_eq!(takeout.read_bytes(&names[0]).unwrap(), b"a\n1\n");
        assert!(matches!(
            takeout.read_bytes("Takeout/missing.csv"),
            Err(FitError::SourceUnavailable { .. })
        ));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
