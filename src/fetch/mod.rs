mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use crate::error::{FitError, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

/// GETs `url` and returns the body, failing on transport errors and non-2xx statuses.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let parsed: reqwest::Url = url.parse().map_err(|e| FitError::unavailable(url, e))?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client
        .execute(req)
        .await
        .map_err(|e| FitError::unavailable(url, e))?;

    let status = resp.status();
    if !status.is_success() {
        let reason = status.canonical_reason().unwrap_or("unknown");
        return Err(FitError::unavailable(
            url,
            format!("request not successful, code {}: {}", status.as_u16(), reason),
        ));
    }

    let bytes = resp.bytes().await.map_err(|e| FitError::unavailable(url, e))?;
    debug!(url, bytes = bytes.len(), "Fetched");
    Ok(bytes.to_vec())
}

/// GETs `url` and decodes the JSON body.
pub async fn fetch_json<C: HttpClient, T: DeserializeOwned>(client: &C, url: &str) -> Result<T> {
    let bytes = fetch_bytes(client, url).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FitError::unavailable(url, format!("invalid JSON: {e}")))
}
