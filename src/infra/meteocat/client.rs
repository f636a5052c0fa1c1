use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike};
use chrono_tz::Tz;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, fetch_json};
use crate::parser::parse_timestamp;
use crate::record::Record;
use crate::services::weather_api::{
    StationMetadata, WeatherProvider, WeatherService, WeatherVariable, observation,
};

pub const BASE_URL: &str = "https://api.meteo.cat/xema/v1";

pub const VARIABLES: &[WeatherVariable] = &[
    WeatherVariable {
        code: "32",
        acronym: "T",
        name: "Temperature",
        unit: "ºC",
    },
    WeatherVariable {
        code: "33",
        acronym: "RH",
        name: "Relative humidity",
        unit: "%",
    },
    WeatherVariable {
        code: "34",
        acronym: "p",
        name: "Air pressure",
        unit: "hPa",
    },
    WeatherVariable {
        code: "35",
        acronym: "pp",
        name: "Precipitation",
        unit: "mm",
    },
];

/// Variable used to look up representative stations (temperature).
const REPRESENTATIVE_VARIABLE: &str = "32";

#[derive(Deserialize)]
struct Measurements {
    #[serde(default)]
    lectures: Vec<Reading>,
}

#[derive(Deserialize)]
struct Reading {
    data: String,
    valor: Option<f64>,
    estat: Option<String>,
}

#[derive(Deserialize)]
struct StationEntry {
    codi: String,
    nom: String,
    coordenades: Option<Coordinates>,
    altitud: Option<f64>,
    comarca: Option<Named>,
}

#[derive(Deserialize)]
struct Coordinates {
    latitud: f64,
    longitud: f64,
}

#[derive(Deserialize)]
struct Named {
    nom: String,
}

#[derive(Deserialize)]
struct Representative {
    #[serde(rename = "codiEstacio", alias = "codi")]
    codi_estacio: String,
}

/// Client for the Meteocat XEMA network. Authenticates with an `X-Api-Key` header.
pub struct MeteocatClient {
    client: ApiKey<BasicClient>,
    base_url: String,
    station: String,
    tz: Tz,
}

impl MeteocatClient {
    pub fn new(
        client: BasicClient,
        api_key: &str,
        station: impl Into<String>,
        tz: Tz,
    ) -> Result<Self> {
        Ok(Self {
            client: ApiKey::new(client, "X-Api-Key", api_key)?,
            base_url: BASE_URL.to_string(),
            station: station.into(),
            tz,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        fetch_json(&self.client, &url).await
    }

    /// Codes of the stations representative of a municipality.
    #[tracing::instrument(skip(self))]
    pub async fn representative_stations(&self, postcode: &str) -> Result<Vec<String>> {
        let path = format!(
            "/representatives/metadades/municipis/{postcode}/variables/{REPRESENTATIVE_VARIABLE}"
        );
        let entries: Vec<Representative> = self.get(&path).await?;
        Ok(entries.into_iter().map(|r| r.codi_estacio).collect())
    }

    async fn fetch_variable(
        &self,
        date: NaiveDate,
        variable: &WeatherVariable,
    ) -> Result<Vec<Reading>> {
        let path = format!(
            "/variables/mesurades/{}/{}/{:02}/{:02}?codiEstacio={}",
            variable.code,
            date.year(),
            date.month(),
            date.day(),
            self.station
        );
        debug!(path = %path, "Downloading measurements");
        let measurements: Measurements = self.get(&path).await?;
        Ok(measurements.lectures)
    }
}

type HourKey = (NaiveDate, u32);
type HourlyMeans = BTreeMap<HourKey, (DateTime<FixedOffset>, f64)>;

/// Valid readings averaged per local hour. Each hour keeps the time of its first reading.
fn hourly_means(readings: &[Reading], tz: Tz) -> HourlyMeans {
    let mut hours: BTreeMap<HourKey, (DateTime<FixedOffset>, f64, usize)> = BTreeMap::new();
    for reading in readings {
        if reading.estat.as_deref() != Some("V") {
            continue;
        }
        let (Some(value), Some(time)) = (reading.valor, parse_timestamp(&reading.data, tz)) else {
            continue;
        };
        let entry = hours
            .entry((time.date_naive(), time.hour()))
            .or_insert((time, 0.0, 0));
        if time < entry.0 {
            entry.0 = time;
        }
        entry.1 += value;
        entry.2 += 1;
    }
    hours
        .into_iter()
        .map(|(key, (time, total, n))| (key, (time, total / n as f64)))
        .collect()
}

/// Joins the hourly series of each variable into one record per hour.
fn merge_hours(series: Vec<(&'static str, HourlyMeans)>) -> Vec<Record> {
    let mut hours: BTreeMap<HourKey, (DateTime<FixedOffset>, Vec<(&'static str, f64)>)> =
        BTreeMap::new();
    for (acronym, means) in series {
        for (key, (time, value)) in means {
            let entry = hours.entry(key).or_insert((time, Vec::new()));
            if time < entry.0 {
                entry.0 = time;
            }
            entry.1.push((acronym, value));
        }
    }
    hours
        .into_values()
        .map(|(time, values)| observation(time, values))
        .collect()
}

#[async_trait]
impl WeatherProvider for MeteocatClient {
    fn service(&self) -> WeatherService {
        WeatherService::Meteocat
    }

    fn station(&self) -> &str {
        &self.station
    }

    fn variables(&self) -> &[WeatherVariable] {
        VARIABLES
    }

    #[tracing::instrument(skip(self), fields(station = %self.station))]
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Record>> {
        let mut series = Vec::with_capacity(VARIABLES.len());
        let mut first_error = None;

        for variable in VARIABLES {
            match self.fetch_variable(date, variable).await {
                Ok(readings) => series.push((variable.acronym, hourly_means(&readings, self.tz))),
                Err(e) => {
                    info!(variable = variable.acronym, error = %e, "No data for variable");
                    first_error.get_or_insert(e);
                }
            }
        }

        if series.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let records = merge_hours(series);
        debug!(hours = records.len(), "Merged hourly observations");
        Ok(records)
    }

    #[tracing::instrument(skip(self))]
    async fn station_metadata(&self, date: NaiveDate) -> Result<Vec<StationMetadata>> {
        let path = format!("/estacions/metadades?estat=ope&data={}Z", date.format("%Y-%m-%d"));
        let entries: Vec<StationEntry> = self.get(&path).await?;
        if entries.is_empty() {
            warn!("No operating stations reported");
        }
        Ok(entries
            .into_iter()
            .map(|e| StationMetadata {
                code: e.codi,
                name: e.nom,
                latitude: e.coordenades.as_ref().map(|c| c.latitud),
                longitude: e.coordenades.as_ref().map(|c| c.longitud),
                altitude: e.altitud,
                region: e.comarca.map(|c| c.nom),
            })
            .collect())
    }
}
