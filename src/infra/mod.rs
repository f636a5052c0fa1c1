//! Weather provider clients and the factory that picks one from [`Settings`].

pub mod aemet;
pub mod meteocat;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Settings;
use crate::error::{FitError, Result};
use crate::fetch::BasicClient;
use crate::services::weather_api::{WeatherProvider, WeatherService};

/// Builds the provider named in `settings.weather.service`.
///
/// Fails with `UnknownService` for other names and with `MissingCredentials`
/// when the service's API key is not set.
pub fn weather_provider(settings: &Settings) -> Result<Arc<dyn WeatherProvider>> {
    let service = settings.service()?;
    let station = settings.station()?;
    let key = settings
        .api_key(service)
        .ok_or_else(|| FitError::MissingCredentials(service.key_var().to_string()))?;

    let client = BasicClient::with_timeout(Duration::from_secs(settings.weather.timeout_secs))
        .map_err(|e| FitError::Config(format!("cannot build HTTP client: {e}")))?;

    info!(service = %service, station = %station, "Using weather provider");
    let provider: Arc<dyn WeatherProvider> = match service {
        WeatherService::Meteocat => Arc::new(meteocat::MeteocatClient::new(
            client,
            key,
            station,
            settings.timezone,
        )?),
        WeatherService::Aemet => Arc::new(aemet::AemetClient::new(
            client,
            key,
            station,
            settings.timezone,
        )),
    };
    Ok(provider)
}
