use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{FitError, Result};
use crate::fetch::auth::UrlParam;
use crate::fetch::{BasicClient, fetch_bytes, fetch_json};
use crate::parser::{parse_decimal, parse_timestamp};
use crate::record::Record;
use crate::services::weather_api::{
    StationMetadata, WeatherProvider, WeatherService, WeatherVariable, observation,
};

pub const BASE_URL: &str = "https://opendata.aemet.es/opendata";

/// `p` is the mean of the daily maximum and minimum pressure.
pub const VARIABLES: &[WeatherVariable] = &[
    WeatherVariable {
        code: "tmed",
        acronym: "T",
        name: "Temperature",
        unit: "ºC",
    },
    WeatherVariable {
        code: "prec",
        acronym: "pp",
        name: "Precipitation",
        unit: "mm",
    },
    WeatherVariable {
        code: "presMax,presMin",
        acronym: "p",
        name: "Pressure",
        unit: "hPa",
    },
];

const INVENTORY_PATH: &str = "/api/valores/climatologicos/inventarioestaciones/todasestaciones";

/// Daily values are reported at a fixed observation time.
const OBSERVATION_TIME: &str = "13:00:00+02:00";

/// First response of every request: a pointer to the actual data.
#[derive(Deserialize)]
struct Envelope {
    descripcion: Option<String>,
    estado: Option<u16>,
    datos: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyValues {
    fecha: Option<String>,
    tmed: Option<String>,
    prec: Option<String>,
    pres_max: Option<String>,
    pres_min: Option<String>,
}

#[derive(Deserialize)]
struct InventoryEntry {
    indicativo: String,
    nombre: String,
    provincia: Option<String>,
    latitud: Option<String>,
    longitud: Option<String>,
    altitud: Option<String>,
}

/// Client for AEMET OpenData. Authenticates with an `api_key` query parameter.
pub struct AemetClient {
    client: UrlParam<BasicClient>,
    base_url: String,
    station: String,
    tz: Tz,
}

impl AemetClient {
    pub fn new(client: BasicClient, api_key: &str, station: impl Into<String>, tz: Tz) -> Self {
        Self {
            client: UrlParam {
                inner: client,
                param_name: "api_key".to_string(),
                key: api_key.to_string(),
            },
            base_url: BASE_URL.to_string(),
            station: station.into(),
            tz,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Requests `path`, then downloads the `datos` document it points to.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let envelope: Envelope = fetch_json(&self.client, &url).await?;
        let Some(datos) = envelope.datos else {
            return Err(FitError::unavailable(
                url,
                format!(
                    "no data (estado {}): {}",
                    envelope.estado.unwrap_or_default(),
                    envelope.descripcion.unwrap_or_default()
                ),
            ));
        };

        // data documents are not always valid UTF-8
        let bytes = fetch_bytes(&self.client.inner, &datos).await?;
        let text = String::from_utf8_lossy(&bytes);
        serde_json::from_str(&text)
            .map_err(|e| FitError::unavailable(datos, format!("invalid JSON: {e}")))
    }
}

fn daily_record(values: &DailyValues, date: NaiveDate, tz: Tz) -> Option<Record> {
    let time = parse_timestamp(&format!("{}T{OBSERVATION_TIME}", date.format("%Y-%m-%d")), tz)?;
    let number = |v: &Option<String>| v.as_deref().and_then(parse_decimal);

    let pressure = match (number(&values.pres_max), number(&values.pres_min)) {
        (Some(max), Some(min)) => Some((max + min) / 2.0),
        _ => None,
    };
    let fields = [("T", number(&values.tmed)), ("pp", number(&values.prec)), ("p", pressure)];
    Some(observation(
        time,
        fields.into_iter().filter_map(|(name, v)| v.map(|v| (name, v))),
    ))
}

/// Parses AEMET's degrees-minutes-seconds notation such as `412342N` or `020412W`.
fn parse_dms(input: &str) -> Option<f64> {
    let input = input.trim();
    let hemisphere = input.chars().last()?;
    let digits = &input[..input.len() - hemisphere.len_utf8()];
    if digits.len() < 5 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (deg, rest) = digits.split_at(digits.len() - 4);
    let (min, sec) = rest.split_at(2);
    let value = deg.parse::<f64>().ok()?
        + min.parse::<f64>().ok()? / 60.0
        + sec.parse::<f64>().ok()? / 3600.0;
    match hemisphere {
        'N' | 'E' => Some(value),
        'S' | 'W' => Some(-value),
        _ => None,
    }
}

#[async_trait]
impl WeatherProvider for AemetClient {
    fn service(&self) -> WeatherService {
        WeatherService::Aemet
    }

    fn station(&self) -> &str {
        &self.station
    }

    fn variables(&self) -> &[WeatherVariable] {
        VARIABLES
    }

    #[tracing::instrument(skip(self), fields(station = %self.station))]
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Record>> {
        let day = date.format("%Y-%m-%d").to_string();
        let path = format!(
            "/api/valores/climatologicos/diarios/datos/fechaini/{day}T00:00:00UTC/fechafin/{day}T23:59:59UTC/estacion/{}",
            self.station
        );
        let values: Vec<DailyValues> = self.get(&path).await?;

        let records: Vec<Record> = values
            .iter()
            .filter(|v| v.fecha.as_deref().is_none_or(|f| f == day))
            .filter_map(|v| daily_record(v, date, self.tz))
            .collect();
        debug!(records = records.len(), "Parsed daily climatology");
        Ok(records)
    }

    /// AEMET's inventory is not dated; `date` is ignored.
    #[tracing::instrument(skip(self))]
    async fn station_metadata(&self, date: NaiveDate) -> Result<Vec<StationMetadata>> {
        let entries: Vec<InventoryEntry> = self.get(INVENTORY_PATH).await?;
        info!(stations = entries.len(), "Fetched station inventory");
        Ok(entries
            .into_iter()
            .map(|e| StationMetadata {
                code: e.indicativo,
                name: e.nombre,
                latitude: e.latitud.as_deref().and_then(parse_dms),
                longitude: e.longitud.as_deref().and_then(parse_dms),
                altitude: e.altitud.as_deref().and_then(parse_decimal),
                region: e.provincia,
            })
            .collect())
    }
}
