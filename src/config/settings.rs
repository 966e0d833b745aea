//! Application settings and configuration management

use crate::error::{AppError, Result};
use crate::models::{ProviderConfig, ProviderExtra, IMAGE_GEN_SERVICE};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Provider rows used to seed the in-memory config store
    #[serde(default)]
    pub providers: Vec<ProviderSeed>,
}

/// Server configuration for the blob routes
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Object storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Local,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// Root directory for the local backend
    #[serde(default = "default_storage_path")]
    pub base_path: String,
    /// Externally reachable base of the blob routes
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Secret used to sign presigned URLs
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,
    #[serde(default = "default_upload_ttl")]
    pub upload_url_ttl_secs: u64,
    #[serde(default = "default_read_ttl")]
    pub read_url_ttl_secs: u64,
    /// Check the object exists before confirming an upload
    #[serde(default)]
    pub verify_on_confirm: bool,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_storage_path() -> String {
    "./object_store".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_signing_secret() -> String {
    "change-me".to_string()
}

fn default_upload_ttl() -> u64 {
    300
}

fn default_read_ttl() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            base_path: default_storage_path(),
            public_url: default_public_url(),
            signing_secret: default_signing_secret(),
            upload_url_ttl_secs: default_upload_ttl(),
            read_url_ttl_secs: default_read_ttl(),
            verify_on_confirm: false,
        }
    }
}

/// Rate limiter housekeeping
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_idle_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

/// Timeouts applied to vendor calls
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationSettings {
    #[serde(default = "default_generation_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_ms: u64,
    #[serde(default = "default_validation_timeout")]
    pub validation_timeout_ms: u64,
}

fn default_generation_timeout() -> u64 {
    120_000
}

fn default_download_timeout() -> u64 {
    30_000
}

fn default_validation_timeout() -> u64 {
    5_000
}

impl GenerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_generation_timeout(),
            download_timeout_ms: default_download_timeout(),
            validation_timeout_ms: default_validation_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Provider row as written in the settings file.
///
/// Vendor knobs are spelled out as snake_case fields here and folded into
/// `ProviderExtra` on conversion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSeed {
    pub id: i64,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub model_id: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub skip_validation: bool,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub requests_per_hour: Option<u32>,
    #[serde(default)]
    pub requests_per_day: Option<u32>,
    #[serde(default)]
    pub cost_per_image: Option<f64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl ProviderSeed {
    pub fn into_config(self) -> ProviderConfig {
        let mut extra = ProviderExtra::new();
        if self.skip_validation {
            extra.insert("skipValidation", Value::Bool(true));
        }
        if self.requests_per_minute.is_some()
            || self.requests_per_hour.is_some()
            || self.requests_per_day.is_some()
        {
            extra.insert(
                "rateLimit",
                json!({
                    "requestsPerMinute": self.requests_per_minute,
                    "requestsPerHour": self.requests_per_hour,
                    "requestsPerDay": self.requests_per_day,
                }),
            );
        }
        if let Some(cost) = self.cost_per_image {
            extra.insert("costPerImage", json!(cost));
        }
        if let Some(timeout) = self.timeout_ms {
            extra.insert("timeoutMs", json!(timeout));
        }

        ProviderConfig {
            id: self.id,
            display_name: self.name,
            provider_kind: self.kind,
            service_kind: IMAGE_GEN_SERVICE.to_string(),
            model_id: self.model_id,
            base_url: self.base_url,
            api_key: self.api_key,
            extra,
            enabled: self.enabled,
            priority: self.priority,
            description: self.description,
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default"))
                    .required(false),
            )
            // Override with environment variables (prefixed with IMAGE_GEN__)
            .add_source(
                Environment::with_prefix("IMAGE_GEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0".to_string()));
        }

        if self.storage.upload_url_ttl_secs == 0 {
            return Err(config_error(
                "storage.upload_url_ttl_secs must be positive".to_string(),
            ));
        }

        if self.storage.signing_secret.trim().is_empty() {
            return Err(config_error("storage.signing_secret cannot be empty".to_string()));
        }

        if self.rate_limit.cleanup_interval_secs == 0 {
            return Err(config_error(
                "rate_limit.cleanup_interval_secs must be positive".to_string(),
            ));
        }

        if self.rate_limit.idle_ttl_secs == 0 {
            return Err(config_error(
                "rate_limit.idle_ttl_secs must be positive".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.kind.trim().is_empty() {
                return Err(config_error(format!(
                    "Provider '{}' must declare a kind",
                    provider.name
                )));
            }
            if provider.base_url.trim().is_empty() {
                return Err(config_error(format!(
                    "Provider '{}' must have a base_url",
                    provider.name
                )));
            }
            if !seen.insert(provider.id) {
                return Err(config_error(format!(
                    "Duplicate provider id {}",
                    provider.id
                )));
            }
        }

        Ok(())
    }

    /// Provider seeds converted to config records
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.providers
            .iter()
            .cloned()
            .map(ProviderSeed::into_config)
            .collect()
    }
}

fn config_error(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}
