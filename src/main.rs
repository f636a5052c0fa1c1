//! CLI entry point for the fit_metrics tool.
//!
//! Provides subcommands for aggregating the daily overview, per-day
//! intervals and sessions of a Google Fit Takeout export, and for querying
//! cached weather observations and station metadata.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use fit_metrics::{
    analyzers::{bucket::TimeUnit, reduction::Reduction, table::ResultTable},
    config::Settings,
    infra::{meteocat::MeteocatClient, weather_provider},
    output::{print_json, print_pretty, write_csv},
    parser::parse_date,
    services::weather_api::WeatherService,
    takeout::{
        CenterLabel, DailyMetrics, OverviewMetrics, SessionMetrics,
        session::SESSION_SCHEMA,
    },
    weather::WeatherStore,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "fit_metrics")]
#[command(about = "Aggregate Google Fit exports and weather observations into time-bucketed tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OutputArgs {
    /// Print the table as JSON instead of aligned text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Also write the table to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gzip the CSV file
    #[arg(long, default_value_t = false)]
    gzip: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the field names (short and long) of every record source
    Columns,
    /// Aggregate the daily overview of a Takeout export
    Overview {
        /// Takeout zip archive or unpacked directory
        #[arg(short, long)]
        takeout: PathBuf,

        /// Fields to aggregate, short or long names (e.g. "min,dis")
        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        /// Time unit: Weekday, Hour, Asis, Day, Week, Month, Year
        #[arg(short, long, default_value = "Weekday")]
        unit: TimeUnit,

        /// Reduction: count, mean, sum, median, min, max, std, first
        #[arg(short, long, default_value = "median")]
        reduction: Reduction,

        /// First day to include
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,

        /// Last day to include
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// Aggregate the 15-minute intervals of one day
    Daily {
        #[arg(short, long)]
        takeout: PathBuf,

        /// Day to read, YYYY-MM-DD or DD-MM-YYYY
        #[arg(short, long)]
        date: String,

        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        #[arg(short, long, default_value = "Hour")]
        unit: TimeUnit,

        #[arg(short, long, default_value = "sum")]
        reduction: Reduction,

        /// Interval timestamp: Left, Right or Center (defaults to the configured label)
        #[arg(short, long)]
        label: Option<CenterLabel>,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// Aggregate the sessions recorded on some dates
    Sessions {
        #[arg(short, long)]
        takeout: PathBuf,

        #[arg(short, long, value_delimiter = ',', required = true)]
        dates: Vec<String>,

        /// Only sessions of these activity types (e.g. "walking,running")
        #[arg(short, long, value_delimiter = ',')]
        activities: Vec<String>,

        #[arg(short, long, value_delimiter = ',', required = true)]
        fields: Vec<String>,

        #[arg(short, long, default_value = "Hour")]
        unit: TimeUnit,

        #[arg(short, long, default_value = "count")]
        reduction: Reduction,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// Weather observations of the configured station, downloading missing dates
    Weather {
        /// Dates to report (today when omitted)
        #[arg(short, long, value_delimiter = ',', value_parser = parse_date)]
        dates: Vec<NaiveDate>,

        #[arg(long)]
        start_hour: Option<u32>,

        #[arg(long)]
        end_hour: Option<u32>,

        /// Reduce the observations of each day with this function
        #[arg(short, long)]
        reduction: Option<Reduction>,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// List the stations of the configured weather service
    Stations {
        /// Reference date (today when omitted)
        #[arg(short, long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Meteocat only: list the stations representative of this municipality code
        #[arg(short, long)]
        postcode: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/fit_metrics.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("fit_metrics.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;

    match cli.command {
        Commands::Columns => {
            for spec in OverviewMetrics::columns() {
                info!(source = "daily", short = spec.short, long = spec.long, "Field");
            }
            for spec in SESSION_SCHEMA.fields() {
                info!(source = "sessions", short = spec.short, long = spec.long, "Field");
            }
            info!(activities = ?OverviewMetrics::activity_types(), "Activity types");
        }
        Commands::Overview {
            takeout,
            fields,
            unit,
            reduction,
            from,
            to,
            out,
        } => {
            let table = OverviewMetrics::open(&takeout, settings.timezone)?
                .with_date_range(from, to)
                .get_variables_per_timeframe_with(&fields, unit, reduction)?;
            emit(&table, &out)?;
        }
        Commands::Daily {
            takeout,
            date,
            fields,
            unit,
            reduction,
            label,
            out,
        } => {
            let label = label.unwrap_or(settings.label);
            let table = DailyMetrics::open(&takeout, &date, settings.timezone, label)?
                .get_variables_per_time(&fields, unit, reduction)?;
            emit(&table, &out)?;
        }
        Commands::Sessions {
            takeout,
            dates,
            activities,
            fields,
            unit,
            reduction,
            out,
        } => {
            let table = SessionMetrics::open(&takeout, &dates, &activities, settings.timezone)?
                .get_variables_per_time(&fields, unit, reduction)?;
            emit(&table, &out)?;
        }
        Commands::Weather {
            dates,
            start_hour,
            end_hour,
            reduction,
            out,
        } => {
            let provider = weather_provider(&settings)?;
            let mut store = WeatherStore::from_settings(provider, &settings);
            let table = store
                .get_daily_weather(&dates, start_hour, end_hour, reduction)
                .await?;
            emit(&table, &out)?;
        }
        Commands::Stations { date, postcode } => {
            let date = date
                .unwrap_or_else(|| Utc::now().with_timezone(&settings.timezone).date_naive());
            match postcode {
                Some(postcode) => {
                    if settings.service()? != WeatherService::Meteocat {
                        anyhow::bail!("representative stations are only available from Meteocat");
                    }
                    let client = meteocat_client(&settings)?;
                    let stations = client.representative_stations(&postcode).await?;
                    info!(postcode = %postcode, stations = ?stations, "Representative stations");
                }
                None => {
                    let stations = weather_provider(&settings)?.station_metadata(date).await?;
                    info!(total = stations.len(), date = %date, "Station list fetched");
                    print_json(&stations)?;
                }
            }
        }
    }

    Ok(())
}

/// Prints the table and writes it to a CSV file if one was requested.
fn emit(table: &ResultTable, out: &OutputArgs) -> Result<()> {
    if out.json {
        print_json(table)?;
    } else {
        print_pretty(table);
    }
    if let Some(path) = &out.output {
        let written = write_csv(path, table, out.gzip)?;
        info!(path = %written.display(), rows = table.len(), "Table written");
    }
    Ok(())
}

fn meteocat_client(settings: &Settings) -> Result<MeteocatClient> {
    let key = settings
        .api_key(WeatherService::Meteocat)
        .context("METEOCAT_API_KEY must be set")?;
    let http = fit_metrics::fetch::BasicClient::with_timeout(Duration::from_secs(
        settings.weather.timeout_secs,
    ))?;
    Ok(MeteocatClient::new(http, key, settings.station()?, settings.timezone)?)
}
