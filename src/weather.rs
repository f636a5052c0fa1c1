//! Weather observations kept in a local CSV cache and topped up from a
//! [`WeatherProvider`] on demand.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

use crate::analyzers::aggregate::aggregate;
use crate::analyzers::bucket::TimeUnit;
use crate::analyzers::reduction::Reduction;
use crate::analyzers::table::ResultTable;
use crate::config::Settings;
use crate::error::{FitError, Result};
use crate::parser::{parse_decimal, parse_timestamp};
use crate::record::{Record, Value};
use crate::services::weather_api::{StationMetadata, WeatherProvider};

/// Observations of one station, cached in `<cache_dir>/<descriptor>_<station>.csv`.
///
/// The cache file has the columns `time,date,hour` followed by the
/// provider's variables. Records are kept sorted by time.
pub struct WeatherStore {
    provider: Arc<dyn WeatherProvider>,
    path: PathBuf,
    tz: Tz,
    concurrency: usize,
    records: Vec<Record>,
    dates: BTreeSet<NaiveDate>,
    loaded: bool,
    /// Rows of the cache file that could not be read; the file is not
    /// overwritten while this is non-zero.
    load_skipped: usize,
}

impl WeatherStore {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        cache_dir: impl AsRef<Path>,
        descriptor: &str,
        tz: Tz,
        concurrency: usize,
    ) -> Self {
        let path = cache_dir
            .as_ref()
            .join(format!("{descriptor}_{}.csv", provider.station()));
        Self {
            provider,
            path,
            tz,
            concurrency: concurrency.max(1),
            records: Vec::new(),
            dates: BTreeSet::new(),
            loaded: false,
            load_skipped: 0,
        }
    }

    pub fn from_settings(provider: Arc<dyn WeatherProvider>, settings: &Settings) -> Self {
        Self::new(
            provider,
            &settings.weather.cache_dir,
            &settings.weather.descriptor,
            settings.timezone,
            settings.weather.concurrency,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Dates with at least one cached observation.
    pub fn dates(&self) -> &BTreeSet<NaiveDate> {
        &self.dates
    }

    fn variable_names(&self) -> Vec<&'static str> {
        self.provider.variables().iter().map(|v| v.acronym).collect()
    }

    fn columns(&self) -> Vec<String> {
        let mut columns = vec!["date".to_string(), "hour".to_string()];
        columns.extend(self.variable_names().into_iter().map(str::to_string));
        columns
    }

    fn set_records(&mut self, mut records: Vec<Record>) {
        records.sort_by_key(|r| r.timestamp);
        self.dates = records.iter().map(|r| r.timestamp.date_naive()).collect();
        self.records = records;
    }

    /// Reads the cache file, replacing what is in memory. A missing file is not an error.
    ///
    /// Unreadable rows are skipped; once any were skipped [`save`](Self::save)
    /// refuses to overwrite the file. On error nothing in memory changes and
    /// the next [`compose`](Self::compose) tries to load again.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&mut self) -> Result<usize> {
        if !self.path.is_file() {
            debug!("No cached weather data");
            self.loaded = true;
            return Ok(0);
        }

        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(&self.path)?;
        let headers = rdr.headers()?.clone();
        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (line, result) in rdr.records().enumerate() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warn!(line, error = %e, "Skipping unreadable cache row");
                    skipped += 1;
                    continue;
                }
            };
            let time = headers
                .iter()
                .position(|h| h == "time")
                .and_then(|idx| row.get(idx))
                .and_then(|t| parse_timestamp(t, self.tz));
            let Some(time) = time else {
                warn!(line, "Skipping cache row without a valid time");
                skipped += 1;
                continue;
            };

            let mut record = Record::new(time);
            for (name, raw) in headers.iter().zip(row.iter()) {
                let raw = raw.trim();
                match name {
                    "time" => {}
                    _ if raw.is_empty() => {}
                    "date" => record.set(name, Value::Text(raw.to_string())),
                    _ => {
                        if let Some(value) = parse_decimal(raw) {
                            record.set_number(name, value);
                        }
                    }
                }
            }
            records.push(record);
        }

        let count = records.len();
        self.set_records(records);
        self.loaded = true;
        self.load_skipped = skipped;
        info!(
            records = count,
            skipped,
            dates = self.dates.len(),
            "Loaded cached weather data"
        );
        Ok(count)
    }

    /// Writes every record in memory to the cache file.
    ///
    /// Fails with `MalformedRecord` when the file had rows that could not be
    /// loaded, since writing would drop them.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn save(&self) -> Result<()> {
        if self.load_skipped > 0 {
            return Err(FitError::MalformedRecord {
                source_name: self.path.display().to_string(),
                skipped: self.load_skipped,
            });
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let columns = self.columns();
        let mut writer = csv::Writer::from_path(&self.path)?;

        let mut header = vec!["time".to_string()];
        header.extend(columns.iter().cloned());
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row = vec![record.timestamp.to_rfc3339()];
            row.extend(
                columns
                    .iter()
                    .map(|c| record.get(c).map(|v| v.to_string()).unwrap_or_default()),
            );
            writer.write_record(&row)?;
        }
        writer.flush()?;

        debug!(records = self.records.len(), "Saved weather data");
        Ok(())
    }

    /// Downloads the dates that are not cached yet and merges them in.
    ///
    /// Dates are fetched concurrently, at most `concurrency` at a time. A
    /// failed date is logged and skipped; if every download fails the first
    /// error is returned. Returns the number of records added.
    #[tracing::instrument(
        skip(self, dates),
        fields(station = %self.provider.station(), requested = dates.len())
    )]
    pub async fn compose(&mut self, dates: &[NaiveDate], save: bool) -> Result<usize> {
        if !self.loaded {
            self.load()?;
        }

        let missing: BTreeSet<NaiveDate> = dates
            .iter()
            .copied()
            .filter(|d| !self.dates.contains(d))
            .collect();
        if missing.is_empty() {
            debug!("All requested dates are cached");
            return Ok(0);
        }
        info!(missing = missing.len(), "Downloading weather data");

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.concurrency));
        let mut tasks = Vec::with_capacity(missing.len());

        for date in missing.iter().copied() {
            let sem = semaphore.clone();
            let provider = self.provider.clone();
            let span = tracing::info_span!("fetch_weather_day", date = %date);

            tasks.push(tokio::spawn(
                async move {
                    let _permit = sem.acquire().await.ok();
                    (date, provider.fetch_day(date).await)
                }
                .instrument(span),
            ));
        }

        let mut added = Vec::new();
        let mut first_error: Option<FitError> = None;
        let mut failures = 0usize;

        for task in tasks {
            match task.await {
                Ok((date, Ok(records))) => {
                    let before = records.len();
                    // a provider may return hours belonging to a neighbouring local date
                    let records: Vec<Record> = records
                        .into_iter()
                        .filter(|r| r.timestamp.date_naive() == date)
                        .collect();
                    debug!(
                        date = %date,
                        records = records.len(),
                        dropped = before - records.len(),
                        "Downloaded"
                    );
                    added.extend(records);
                }
                Ok((date, Err(e))) => {
                    warn!(date = %date, error = %e, "No weather data for date");
                    failures += 1;
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "Weather download task failed");
                    failures += 1;
                    first_error.get_or_insert(FitError::unavailable(
                        format!("weather station {}", self.provider.station()),
                        format!("download task failed: {e}"),
                    ));
                }
            }
        }

        if failures == missing.len() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let count = added.len();
        if count > 0 {
            let mut records = std::mem::take(&mut self.records);
            records.extend(added);
            self.set_records(records);
        }
        info!(added = count, failures, "Composed weather data");

        if save && count > 0 {
            if self.load_skipped > 0 {
                warn!(
                    skipped = self.load_skipped,
                    "Cache file has unreadable rows, not overwriting it"
                );
            } else {
                self.save()?;
            }
        }
        Ok(count)
    }

    /// Observations of `dates` (today when empty), restricted to
    /// `start_hour..=end_hour`.
    ///
    /// Without a reduction the table has one row per observation, keyed by
    /// `time`, with the columns `date`, `hour` and the provider's variables.
    /// With a reduction the variables are reduced per `Day`.
    #[tracing::instrument(skip(self, dates), fields(dates = dates.len()))]
    pub async fn get_daily_weather(
        &mut self,
        dates: &[NaiveDate],
        start_hour: Option<u32>,
        end_hour: Option<u32>,
        reduction: Option<Reduction>,
    ) -> Result<ResultTable> {
        let dates: Vec<NaiveDate> = if dates.is_empty() {
            vec![Utc::now().with_timezone(&self.tz).date_naive()]
        } else {
            dates.to_vec()
        };
        self.compose(&dates, true).await?;

        let wanted: BTreeSet<NaiveDate> = dates.into_iter().collect();
        let selected: Vec<Record> = self
            .records
            .iter()
            .filter(|r| wanted.contains(&r.timestamp.date_naive()))
            .filter(|r| {
                let hour = r.number("hour").map(|h| h as u32);
                start_hour.is_none_or(|s| hour.is_some_and(|h| h >= s))
                    && end_hour.is_none_or(|e| hour.is_some_and(|h| h <= e))
            })
            .cloned()
            .collect();

        let table = match reduction {
            None => aggregate(&selected, &self.columns(), TimeUnit::Asis, Reduction::First),
            Some(reduction) => {
                aggregate(&selected, &self.variable_names(), TimeUnit::Day, reduction)
            }
        };
        Ok(table)
    }

    pub async fn station_metadata(&self, date: NaiveDate) -> Result<Vec<StationMetadata>> {
        self.provider.station_metadata(date).await
    }
}
