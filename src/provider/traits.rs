//! Common traits and types for image generation providers

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::{ConfigId, GenerationOptions, ProviderConfig};

/// Generated image as returned by a vendor: hosted URL or inline data.
/// Exactly one form is ever present.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePayload {
    Url(String),
    Base64(String),
}

/// Successful vendor result, normalized across adapters
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub payload: ImagePayload,
    pub provider_kind: String,
    pub config_id: ConfigId,
    pub model_used: Option<String>,
    /// Vendor extras such as the returned seed
    pub metadata: Map<String, Value>,
    pub cost_estimate: Option<f64>,
}

/// Result of one vendor call.
///
/// Adapters never return transport errors; every failure is folded into
/// `Failure` at the adapter boundary.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Success(GeneratedImage),
    Failure {
        provider_kind: String,
        config_id: ConfigId,
        error_message: String,
    },
}

impl GenerationOutcome {
    /// Fold an adapter-internal result into an outcome
    pub fn from_result(config: &ProviderConfig, result: Result<GeneratedImage>) -> Self {
        match result {
            Ok(image) => GenerationOutcome::Success(image),
            Err(error) => {
                let error_message = match error {
                    AppError::GenerationFailed(message) => message,
                    other => other.to_string(),
                };
                warn!(
                    provider = %config.provider_kind,
                    config_id = config.id,
                    error = %error_message,
                    "Provider call failed"
                );
                GenerationOutcome::Failure {
                    provider_kind: config.provider_kind.clone(),
                    config_id: config.id,
                    error_message,
                }
            }
        }
    }
}

/// Uniform capability set every vendor adapter implements
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Vendor tag this adapter serves
    fn kind(&self) -> &str;

    /// Configuration the adapter was built from; never changes afterwards
    fn config(&self) -> &ProviderConfig;

    fn config_id(&self) -> ConfigId {
        self.config().id
    }

    fn name(&self) -> String {
        self.config().handle()
    }

    /// Upper bound for the liveness probe
    fn validation_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Text-to-image
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> GenerationOutcome;

    /// Edit the white region of `mask_url` within `image_url`
    async fn inpaint(
        &self,
        image_url: &str,
        mask_url: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> GenerationOutcome;

    /// Lightweight vendor call proving the credentials work
    async fn probe(&self) -> Result<bool>;

    /// Liveness check used by auto selection. Never fails: probe errors and
    /// timeouts report `false`.
    async fn validate_config(&self) -> bool {
        let config = self.config();
        if config.extra.skip_validation() {
            debug!(provider = %self.name(), "Validation skipped by configuration");
            return true;
        }
        if config.api_key.trim().is_empty() {
            warn!(provider = %self.name(), "API key not configured");
            return false;
        }

        match tokio::time::timeout(self.validation_timeout(), self.probe()).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                warn!(provider = %self.name(), error = %e, "Provider validation failed");
                false
            }
            Err(_) => {
                warn!(provider = %self.name(), "Provider validation timed out");
                false
            }
        }
    }
}
