//! Image Generation Orchestrator
//!
//! Provider orchestration core for multi-vendor AI image generation:
//! vendor selection, per-configuration rate limiting, normalization of
//! vendor output and the two-phase upload lifecycle of binary assets.

pub mod assets;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod provider;
pub mod storage;
pub mod store;

pub use error::{AppError, Result};

use std::sync::Arc;
use std::time::Duration;

use assets::AssetManager;
use gateway::{GenerationOrchestrator, ProviderAdmin, RateLimiter};
use provider::ProviderRegistry;
use storage::{ObjectStorage, UrlSigner};
use store::{
    AssetStore, ConfigStore, GenerationStore, MemoryAssetStore, MemoryConfigStore,
    MemoryGenerationStore,
};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub configs: Arc<dyn ConfigStore>,
    pub assets_store: Arc<dyn AssetStore>,
    pub generations: Arc<dyn GenerationStore>,
    pub signer: Arc<UrlSigner>,
    pub storage: Arc<dyn ObjectStorage>,
    pub assets: Arc<AssetManager>,
    pub registry: Arc<ProviderRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub admin: Arc<ProviderAdmin>,
}

impl AppState {
    /// Wire every component from settings, seeding the in-memory config
    /// store with the configured providers. Providers are not loaded until
    /// `registry.reload()` runs.
    pub fn from_settings(settings: config::Settings) -> Result<Self> {
        let configs: Arc<dyn ConfigStore> =
            Arc::new(MemoryConfigStore::with_configs(settings.provider_configs()));
        Self::with_stores(
            settings,
            configs,
            Arc::new(MemoryAssetStore::new()),
            Arc::new(MemoryGenerationStore::new()),
        )
    }

    /// Wire every component around caller-supplied stores
    pub fn with_stores(
        settings: config::Settings,
        configs: Arc<dyn ConfigStore>,
        assets_store: Arc<dyn AssetStore>,
        generations: Arc<dyn GenerationStore>,
    ) -> Result<Self> {
        let signer = Arc::new(UrlSigner::new(
            &settings.storage.public_url,
            settings.storage.signing_secret.clone(),
        )?);
        let storage = storage::from_config(&settings.storage, signer.clone())?;

        let assets = Arc::new(AssetManager::new(
            assets_store.clone(),
            storage.clone(),
            &settings.storage,
        ));
        let registry = Arc::new(ProviderRegistry::with_default_factories(
            configs.clone(),
            settings.generation.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(
            configs.clone(),
            Duration::from_secs(settings.rate_limit.idle_ttl_secs),
        ));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            registry.clone(),
            limiter.clone(),
            assets.clone(),
            generations.clone(),
            configs.clone(),
        ));
        let admin = Arc::new(ProviderAdmin::new(
            configs.clone(),
            registry.clone(),
            generations.clone(),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            configs,
            assets_store,
            generations,
            signer,
            storage,
            assets,
            registry,
            limiter,
            orchestrator,
            admin,
        })
    }

    /// Routes serving presigned blob URLs
    pub fn blob_router(&self) -> axum::Router {
        storage::routes::router(self.storage.clone(), self.signer.clone())
    }
}
