//! Runtime settings: a TOML file plus API keys from the environment.
//!
//! ```toml
//! timezone = "Europe/Madrid"
//! label = "Center"
//!
//! [weather]
//! service = "Meteocat"
//! station = "UK"
//! cache_dir = "data"
//! descriptor = "weather"
//! concurrency = 4
//! timeout_secs = 30
//! ```

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{FitError, Result};
use crate::services::weather_api::WeatherService;
use crate::takeout::CenterLabel;

/// Environment variable pointing at the settings file.
pub const CONFIG_VAR: &str = "FIT_METRICS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fit_metrics.toml";

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "deserialize_tz")]
    pub timezone: Tz,
    pub label: CenterLabel,
    pub weather: WeatherSettings,
    #[serde(skip)]
    meteocat_api_key: Option<String>,
    #[serde(skip)]
    aemet_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherSettings {
    /// `Meteocat` or `AEMET`; checked when the provider is built.
    pub service: String,
    /// Station code; the service's default station when unset.
    pub station: Option<String>,
    pub cache_dir: PathBuf,
    pub descriptor: String,
    /// Maximum number of dates downloaded at once.
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Madrid,
            label: CenterLabel::Center,
            weather: WeatherSettings::default(),
            meteocat_api_key: None,
            aemet_api_key: None,
        }
    }
}

/// API keys are shown only as set or unset.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("Settings")
            .field("timezone", &self.timezone)
            .field("label", &self.label)
            .field("weather", &self.weather)
            .field("meteocat_api_key", &redact(&self.meteocat_api_key))
            .field("aemet_api_key", &redact(&self.aemet_api_key))
            .finish()
    }
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            service: "Meteocat".to_string(),
            station: None,
            cache_dir: PathBuf::from("."),
            descriptor: "weather".to_string(),
            concurrency: 4,
            timeout_secs: 30,
        }
    }
}

fn deserialize_tz<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Tz, D::Error> {
    let name = String::deserialize(deserializer)?;
    name.parse::<Tz>()
        .map_err(|e| serde::de::Error::custom(format!("invalid timezone '{name}': {e}")))
}

impl Settings {
    /// Loads the file named by `FIT_METRICS_CONFIG` (or `fit_metrics.toml`)
    /// and picks up the API keys from the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Ok(Self::from_file(&path)?.with_env_keys())
    }

    /// Reads settings from `path`; a missing file yields the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&text)?;
        info!(path = %path.display(), timezone = %settings.timezone, "Loaded settings");
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(text).map_err(|e| FitError::Config(e.to_string()))?;
        if settings.weather.concurrency == 0 {
            return Err(FitError::Config("weather.concurrency must be at least 1".to_string()));
        }
        Ok(settings)
    }

    pub fn with_env_keys(mut self) -> Self {
        self.meteocat_api_key = std::env::var(WeatherService::Meteocat.key_var()).ok();
        self.aemet_api_key = std::env::var(WeatherService::Aemet.key_var()).ok();
        self
    }

    pub fn with_api_key(mut self, service: WeatherService, key: impl Into<String>) -> Self {
        match service {
            WeatherService::Meteocat => self.meteocat_api_key = Some(key.into()),
            WeatherService::Aemet => self.aemet_api_key = Some(key.into()),
        }
        self
    }

    pub fn api_key(&self, service: WeatherService) -> Option<&str> {
        match service {
            WeatherService::Meteocat => self.meteocat_api_key.as_deref(),
            WeatherService::Aemet => self.aemet_api_key.as_deref(),
        }
        .filter(|k| !k.is_empty())
    }

    pub fn service(&self) -> Result<WeatherService> {
        self.weather.service.parse()
    }

    pub fn station(&self) -> Result<String> {
        match &self.weather.station {
            Some(station) => Ok(station.clone()),
            None => Ok(self.service()?.default_station().to_string()),
        }
    }
}
