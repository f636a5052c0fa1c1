//! Output formatting and persistence for result tables.
//!
//! Supports pretty-printing, JSON serialization, and CSV files (optionally gzipped).

use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzers::table::ResultTable;
use crate::error::Result;

/// Renders the table as aligned text columns.
pub fn render(table: &ResultTable) -> String {
    let headers = table.headers();
    let rows = table.to_string_records();

    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{c:>w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = line(&headers);
    for row in &rows {
        out.push('\n');
        out.push_str(&line(row));
    }
    out
}

/// Logs the table as aligned text.
pub fn print_pretty(table: &ResultTable) {
    info!(
        rows = table.len(),
        skipped = table.skipped(),
        "\n{}",
        render(table)
    );
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes the table as CSV with a header row, overwriting `path`.
///
/// With `gzip` the output is compressed and `.gz` is appended to the file
/// name if missing. Returns the path written.
pub fn write_csv<P: AsRef<Path>>(path: P, table: &ResultTable, gzip: bool) -> Result<PathBuf> {
    let mut path = path.as_ref().to_path_buf();
    if gzip && path.extension().is_none_or(|e| e != "gz") {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".gz");
        path.set_file_name(name);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(table.headers())?;
    for row in table.to_string_records() {
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let mut file = File::create(&path)?;
    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        file.write_all(&encoder.finish()?)?;
    } else {
        file.write_all(&bytes)?;
    }

    debug!(path = %path.display(), rows = table.len(), gzip, "Wrote CSV");
    Ok(path)
}
