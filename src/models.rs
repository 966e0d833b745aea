//! Data model shared by the registry, the asset manager and the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub type ConfigId = i64;
pub type AssetId = i64;
pub type GenerationId = i64;
pub type UserId = i64;

/// Service kind served by this crate
pub const IMAGE_GEN_SERVICE: &str = "image-gen";

const MIN_VENDOR_TIMEOUT_MS: u64 = 60_000;
const MAX_VENDOR_TIMEOUT_MS: u64 = 120_000;

/// A vendor configuration record as held by the config store
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: ConfigId,
    pub display_name: String,
    /// Vendor tag used to pick an adapter factory (`openai`, `stability`, ...)
    pub provider_kind: String,
    #[serde(default = "default_service_kind")]
    pub service_kind: String,
    #[serde(default)]
    pub model_id: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub extra: ProviderExtra,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_service_kind() -> String {
    IMAGE_GEN_SERVICE.to_string()
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// `{kind}-{id}`, used as the adapter's display handle in logs
    pub fn handle(&self) -> String {
        format!("{}-{}", self.provider_kind, self.id)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

// api_key stays out of logs
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("provider_kind", &self.provider_kind)
            .field("service_kind", &self.service_kind)
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("extra", &self.extra)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Partial update applied through `ConfigStore::update`
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigPatch {
    pub display_name: Option<String>,
    pub model_id: Option<Option<String>>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub extra: Option<ProviderExtra>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub description: Option<Option<String>>,
}

impl ProviderConfigPatch {
    pub fn extra(extra: ProviderExtra) -> Self {
        Self {
            extra: Some(extra),
            ..Default::default()
        }
    }

    pub fn apply(self, config: &mut ProviderConfig) {
        if let Some(v) = self.display_name {
            config.display_name = v;
        }
        if let Some(v) = self.model_id {
            config.model_id = v;
        }
        if let Some(v) = self.base_url {
            config.base_url = v;
        }
        if let Some(v) = self.api_key {
            config.api_key = v;
        }
        if let Some(v) = self.extra {
            config.extra = v;
        }
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.priority {
            config.priority = v;
        }
        if let Some(v) = self.description {
            config.description = v;
        }
    }
}

/// Vendor-specific knobs stored as an opaque JSON object.
///
/// Known keys: `rateLimit`, `presets`, `skipValidation`, `costPerImage`,
/// `timeoutMs`. Anything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderExtra(pub Map<String, Value>);

impl ProviderExtra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn skip_validation(&self) -> bool {
        self.0
            .get("skipValidation")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn rate_limit(&self) -> Option<RateLimitPolicy> {
        self.0
            .get("rateLimit")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_rate_limit(&mut self, policy: &RateLimitPolicy) -> serde_json::Result<()> {
        self.insert("rateLimit", serde_json::to_value(policy)?);
        Ok(())
    }

    pub fn presets(&self) -> BTreeMap<String, GenerationOptions> {
        self.0
            .get("presets")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn preset(&self, name: &str) -> Option<GenerationOptions> {
        self.0
            .get("presets")
            .and_then(|v| v.get(name))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_presets(
        &mut self,
        presets: &BTreeMap<String, GenerationOptions>,
    ) -> serde_json::Result<()> {
        self.insert("presets", serde_json::to_value(presets)?);
        Ok(())
    }

    pub fn cost_per_image(&self) -> Option<f64> {
        self.0.get("costPerImage").and_then(Value::as_f64)
    }

    /// Vendor call timeout, clamped to 60–120s
    pub fn vendor_timeout(&self, default: Duration) -> Duration {
        let ms = self
            .0
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .unwrap_or(default.as_millis() as u64);
        Duration::from_millis(ms.clamp(MIN_VENDOR_TIMEOUT_MS, MAX_VENDOR_TIMEOUT_MS))
    }
}

impl From<Value> for ProviderExtra {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// Optional request ceilings for one configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u32>,
}

impl RateLimitPolicy {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            requests_per_minute: Some(limit),
            ..Default::default()
        }
    }
}

/// Generation knobs understood by the adapters. Each adapter maps what its
/// vendor supports and drops the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "cfgScale")]
    pub guidance_scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerationOptions {
    /// Fill every unset field from `defaults`
    pub fn or(self, defaults: GenerationOptions) -> Self {
        Self {
            width: self.width.or(defaults.width),
            height: self.height.or(defaults.height),
            aspect_ratio: self.aspect_ratio.or(defaults.aspect_ratio),
            negative_prompt: self.negative_prompt.or(defaults.negative_prompt),
            style: self.style.or(defaults.style),
            steps: self.steps.or(defaults.steps),
            guidance_scale: self.guidance_scale.or(defaults.guidance_scale),
            seed: self.seed.or(defaults.seed),
            samples: self.samples.or(defaults.samples),
            model: self.model.or(defaults.model),
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.samples.unwrap_or(1).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Uploaded,
}

/// A binary object tracked through the pending → uploaded lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: Option<u64>,
    pub status: AssetStatus,
    pub owner_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Vendor-hosted output referenced by URL rather than stored by us
    pub fn is_external(&self) -> bool {
        self.storage_key.starts_with("http://") || self.storage_key.starts_with("https://")
    }

    /// Unowned assets are readable by anyone
    pub fn is_accessible_by(&self, user: UserId) -> bool {
        self.owner_user_id.map_or(true, |owner| owner == user)
    }
}

/// Fields needed to create an asset row
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: Option<u64>,
    pub status: AssetStatus,
    pub owner_user_id: Option<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationKind {
    TextToImage,
    Inpaint,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::TextToImage => "text-to-image",
            GenerationKind::Inpaint => "inpaint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Completed,
    Failed,
}

/// Immutable audit row for one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: GenerationId,
    pub owner_user_id: UserId,
    pub asset_id: AssetId,
    pub kind: GenerationKind,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub provider_kind: String,
    pub model_used: Option<String>,
    pub config_id_used: ConfigId,
    pub parameters: Value,
    pub metadata: Value,
    pub cost_estimate: Option<f64>,
    pub status: GenerationStatus,
    pub source_asset_id: Option<AssetId>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to write a generation record; the store assigns id and time
#[derive(Debug, Clone)]
pub struct NewGenerationRecord {
    pub owner_user_id: UserId,
    pub asset_id: AssetId,
    pub kind: GenerationKind,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub provider_kind: String,
    pub model_used: Option<String>,
    pub config_id_used: ConfigId,
    pub parameters: Value,
    pub metadata: Value,
    pub cost_estimate: Option<f64>,
    pub status: GenerationStatus,
    pub source_asset_id: Option<AssetId>,
}
