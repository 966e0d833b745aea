//! Top-level generation flow: resolve a provider, gate it, call it and
//! persist what comes back

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assets::{AssetManager, AssetRef};
use crate::error::{AppError, Result};
use crate::models::{
    AssetId, ConfigId, GenerationId, GenerationKind, GenerationOptions, GenerationRecord,
    GenerationStatus, NewGenerationRecord, UserId, IMAGE_GEN_SERVICE,
};
use crate::provider::{
    GeneratedImage, GenerationOutcome, ImagePayload, ImageProvider, ProviderRegistry,
    ProviderSummary,
};
use crate::storage::{base64, ImageFormat};
use crate::store::{ConfigStore, GenerationStore};

use super::rate_limit::RateLimiter;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;
// Content type assumed for vendor output we cannot sniff
const FALLBACK_CONTENT_TYPE: &str = "image/png";

/// Text-to-image request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<ConfigId>,
    /// Vendor kind, or `auto`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Name of a preset stored on the resolved config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

/// Inpaint request: edit the white region of a mask within an image
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InpaintImageRequest {
    pub image_asset_id: AssetId,
    pub mask_asset_id: AssetId,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<ConfigId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

/// What a caller gets back from a successful generation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: GenerationId,
    pub asset_id: AssetId,
    pub image_url: String,
    pub provider_kind: String,
    pub config_id: ConfigId,
    pub model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub count: usize,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Received,
    ProviderResolved,
    RateChecked,
    VendorCalled,
    AssetPersisted,
    RecordWritten,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::ProviderResolved => "provider_resolved",
            Stage::RateChecked => "rate_checked",
            Stage::VendorCalled => "vendor_called",
            Stage::AssetPersisted => "asset_persisted",
            Stage::RecordWritten => "record_written",
        }
    }
}

/// Per-request bookkeeping carried through the stages
struct Job<'a> {
    id: Uuid,
    kind: GenerationKind,
    user: UserId,
    prompt: &'a str,
    parameters: Value,
    source_asset_id: Option<AssetId>,
}

impl Job<'_> {
    fn stage(&self, stage: Stage) {
        info!(
            request_id = %self.id,
            kind = self.kind.as_str(),
            user_id = self.user,
            stage = stage.as_str(),
            "Generation stage"
        );
    }
}

/// Output persisted as an asset
struct StoredOutput {
    asset_id: AssetId,
    url: String,
}

/// Coordinates registry, limiter, adapters and asset persistence
pub struct GenerationOrchestrator {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<RateLimiter>,
    assets: Arc<AssetManager>,
    generations: Arc<dyn GenerationStore>,
    configs: Arc<dyn ConfigStore>,
}

impl GenerationOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        limiter: Arc<RateLimiter>,
        assets: Arc<AssetManager>,
        generations: Arc<dyn GenerationStore>,
        configs: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            registry,
            limiter,
            assets,
            generations,
            configs,
        }
    }

    pub async fn generate_image(
        &self,
        request: GenerateImageRequest,
        user: UserId,
    ) -> Result<GenerationResult> {
        let job = Job {
            id: Uuid::new_v4(),
            kind: GenerationKind::TextToImage,
            user,
            prompt: &request.prompt,
            parameters: serde_json::to_value(&request)?,
            source_asset_id: None,
        };
        job.stage(Stage::Received);

        let (provider, options) = self
            .acquire(
                &job,
                request.config_id,
                request.provider.as_deref(),
                request.preset.as_deref(),
                &request.options,
            )
            .await?;

        let outcome = self
            .call_vendor(provider.as_ref(), provider.generate(&request.prompt, &options))
            .await;
        self.finish(&job, outcome, &options).await
    }

    pub async fn inpaint_image(
        &self,
        request: InpaintImageRequest,
        user: UserId,
    ) -> Result<GenerationResult> {
        let job = Job {
            id: Uuid::new_v4(),
            kind: GenerationKind::Inpaint,
            user,
            prompt: &request.prompt,
            parameters: serde_json::to_value(&request)?,
            source_asset_id: Some(request.image_asset_id),
        };
        job.stage(Stage::Received);

        // Inputs must be readable by the caller before anything else happens
        let image = self
            .assets
            .issue_read_url(AssetRef::Id(request.image_asset_id), user, None)
            .await?;
        let mask = self
            .assets
            .issue_read_url(AssetRef::Id(request.mask_asset_id), user, None)
            .await?;

        let (provider, options) = self
            .acquire(
                &job,
                request.config_id,
                request.provider.as_deref(),
                request.preset.as_deref(),
                &request.options,
            )
            .await?;

        let outcome = self
            .call_vendor(
                provider.as_ref(),
                provider.inpaint(&image.url, &mask.url, &request.prompt, &options),
            )
            .await;
        self.finish(&job, outcome, &options).await
    }

    /// Resolve the provider, settle the request options and charge one
    /// request against the provider's limit. Nothing is charged when the
    /// options cannot be settled.
    async fn acquire(
        &self,
        job: &Job<'_>,
        config_id: Option<ConfigId>,
        kind: Option<&str>,
        preset: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<(Arc<dyn ImageProvider>, GenerationOptions)> {
        let provider = self.registry.resolve(config_id, kind).await?;
        info!(request_id = %job.id, provider = %provider.name(), "Provider resolved");
        job.stage(Stage::ProviderResolved);

        let options = self.apply_preset(provider.as_ref(), preset, options).await?;

        if !self.limiter.check_and_consume(provider.config_id()).await? {
            warn!(request_id = %job.id, config_id = provider.config_id(), "Rate limit exceeded");
            return Err(AppError::RateLimited(provider.config_id()));
        }
        job.stage(Stage::RateChecked);
        Ok((provider, options))
    }

    /// Fill unset request options from a named preset. Presets are read from
    /// the stored config so admin edits apply without a reload.
    async fn apply_preset(
        &self,
        provider: &dyn ImageProvider,
        preset: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<GenerationOptions> {
        let Some(name) = preset else {
            return Ok(options.clone());
        };
        let extra = match self.configs.get(provider.config_id()).await? {
            Some(config) => config.extra,
            None => provider.config().extra.clone(),
        };
        let defaults = extra.preset(name).ok_or_else(|| {
            AppError::InvalidRequest(format!(
                "preset '{}' is not defined for {}",
                name,
                provider.name()
            ))
        })?;
        Ok(options.clone().or(defaults))
    }

    /// Run a vendor call under the config's timeout
    async fn call_vendor<F>(&self, provider: &dyn ImageProvider, call: F) -> GenerationOutcome
    where
        F: std::future::Future<Output = GenerationOutcome>,
    {
        let config = provider.config();
        let limit = config.extra.vendor_timeout(self.registry.settings().timeout());
        match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => GenerationOutcome::Failure {
                provider_kind: config.provider_kind.clone(),
                config_id: config.id,
                error_message: format!("provider did not respond within {}s", limit.as_secs()),
            },
        }
    }

    async fn finish(
        &self,
        job: &Job<'_>,
        outcome: GenerationOutcome,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        job.stage(Stage::VendorCalled);
        let image = match outcome {
            GenerationOutcome::Success(image) => image,
            GenerationOutcome::Failure {
                provider_kind,
                config_id,
                error_message,
            } => {
                warn!(
                    request_id = %job.id,
                    provider = %provider_kind,
                    config_id = config_id,
                    error = %error_message,
                    "Generation failed, nothing persisted"
                );
                return Err(AppError::GenerationFailed(error_message));
            }
        };

        let stored = self.persist(job, &image).await?;
        job.stage(Stage::AssetPersisted);

        let mut metadata = image.metadata.clone();
        metadata.insert("configId".to_string(), Value::from(image.config_id));

        let record = self
            .generations
            .insert(NewGenerationRecord {
                owner_user_id: job.user,
                asset_id: stored.asset_id,
                kind: job.kind,
                prompt: job.prompt.to_string(),
                negative_prompt: options.negative_prompt.clone(),
                provider_kind: image.provider_kind.clone(),
                model_used: image.model_used.clone(),
                config_id_used: image.config_id,
                parameters: job.parameters.clone(),
                metadata: Value::Object(metadata),
                cost_estimate: image.cost_estimate,
                status: GenerationStatus::Completed,
                source_asset_id: job.source_asset_id,
            })
            .await?;
        job.stage(Stage::RecordWritten);

        Ok(GenerationResult {
            id: record.id,
            asset_id: stored.asset_id,
            image_url: stored.url,
            provider_kind: image.provider_kind,
            config_id: image.config_id,
            model_used: image.model_used,
            created_at: record.created_at,
        })
    }

    async fn persist(&self, job: &Job<'_>, image: &GeneratedImage) -> Result<StoredOutput> {
        match &image.payload {
            ImagePayload::Base64(data) => {
                let bytes = base64::decode(data)?;
                let (extension, content_type) = match ImageFormat::detect(&bytes) {
                    Some(format) => (format.extension(), format.content_type()),
                    None => (
                        "png",
                        base64::data_url_content_type(data).unwrap_or(FALLBACK_CONTENT_TYPE),
                    ),
                };
                let filename = format!(
                    "{}/{}-{}.{}",
                    job.kind.as_str(),
                    Utc::now().timestamp_millis(),
                    Uuid::new_v4(),
                    extension
                );
                let ingested = self
                    .assets
                    .ingest_generated_bytes(bytes, &filename, content_type, Some(job.user))
                    .await?;
                Ok(StoredOutput {
                    asset_id: ingested.asset.id,
                    url: ingested.url,
                })
            }
            ImagePayload::Url(url) => {
                let asset = self
                    .assets
                    .register_external(url, FALLBACK_CONTENT_TYPE, Some(job.user))
                    .await?;
                Ok(StoredOutput {
                    asset_id: asset.id,
                    url: url.clone(),
                })
            }
        }
    }

    /// Caller's generation history, newest first
    pub async fn user_generations(
        &self,
        user: UserId,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<GenerationRecord>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        self.generations
            .list_by_owner(user, limit, offset.unwrap_or(0))
            .await
    }

    /// One generation owned by the caller
    pub async fn generation(&self, id: GenerationId, user: UserId) -> Result<GenerationRecord> {
        self.generations
            .get(id)
            .await?
            .filter(|record| record.owner_user_id == user)
            .ok_or_else(|| AppError::NotFound(format!("generation {}", id)))
    }

    /// Enabled image-gen configs as stored, highest priority first
    pub async fn list_providers(&self) -> Result<Vec<ProviderSummary>> {
        let configs = self.configs.list_enabled(IMAGE_GEN_SERVICE).await?;
        Ok(configs.iter().map(ProviderSummary::from).collect())
    }

    pub async fn reload_providers(&self) -> Result<ReloadSummary> {
        info!("Reloading image providers");
        let count = self.registry.reload().await?;
        Ok(ReloadSummary { count })
    }
}
