//! HTTP plumbing shared by the vendor adapters

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::config::GenerationSettings;
use crate::error::{AppError, Result};
use crate::models::{GenerationOptions, ProviderConfig};

/// Timeouts one adapter applies to its vendor calls
#[derive(Debug, Clone, Copy)]
pub struct VendorTimeouts {
    pub request: Duration,
    pub download: Duration,
    pub validation: Duration,
}

impl VendorTimeouts {
    pub fn for_config(config: &ProviderConfig, settings: &GenerationSettings) -> Self {
        Self {
            request: config.extra.vendor_timeout(settings.timeout()),
            download: settings.download_timeout(),
            validation: settings.validation_timeout(),
        }
    }
}

/// Build the client an adapter uses for every call
pub fn build_client(timeouts: &VendorTimeouts) -> Result<Client> {
    Client::builder()
        .timeout(timeouts.request)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport error to a generation failure
pub fn transport_error(error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::GenerationFailed(format!("provider request timed out: {}", error))
    } else if error.is_connect() {
        AppError::GenerationFailed(format!("could not connect to provider: {}", error))
    } else {
        AppError::GenerationFailed(format!("provider request failed: {}", error))
    }
}

/// Decode a vendor JSON response.
///
/// Non-2xx bodies are searched with `error_message` so the vendor's own
/// wording reaches the caller.
pub async fn read_json<T: DeserializeOwned>(
    response: Response,
    error_message: fn(&Value) -> Option<String>,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| format!("provider returned {}: {}", status, body));
        return Err(AppError::GenerationFailed(message));
    }

    serde_json::from_str(&body)
        .map_err(|e| AppError::GenerationFailed(format!("malformed provider response: {}", e)))
}

/// Fetch an input image for vendors that need raw bytes
pub async fn download_image(client: &Client, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(transport_error)?;

    if !response.status().is_success() {
        return Err(AppError::GenerationFailed(format!(
            "failed to fetch input image ({})",
            response.status()
        )));
    }

    let bytes = response.bytes().await.map_err(transport_error)?;
    Ok(bytes.to_vec())
}

/// `{"error": {"message": ...}}`
pub fn nested_error_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `{"message": ...}`
pub fn top_level_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Per-image price from the config times the number of samples requested
pub fn cost_estimate(config: &ProviderConfig, options: &GenerationOptions) -> Option<f64> {
    config
        .extra
        .cost_per_image()
        .map(|price| price * f64::from(options.sample_count()))
}
