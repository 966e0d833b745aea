//! Persistence collaborators: provider configs, assets and generation records
//!
//! The core only talks to these traits; `memory` holds process-local
//! implementations used by the binary and the tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Asset, AssetId, ConfigId, GenerationId, GenerationRecord, NewAsset, NewGenerationRecord,
    ProviderConfig, ProviderConfigPatch, UserId,
};

pub use memory::{MemoryAssetStore, MemoryConfigStore, MemoryGenerationStore};

/// Source of provider configuration records
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Enabled configs of one service kind, highest priority first
    async fn list_enabled(&self, service_kind: &str) -> Result<Vec<ProviderConfig>>;

    async fn get(&self, id: ConfigId) -> Result<Option<ProviderConfig>>;

    /// Apply a patch and return the updated record
    async fn update(&self, id: ConfigId, patch: ProviderConfigPatch) -> Result<ProviderConfig>;
}

/// Asset rows
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn create(&self, asset: NewAsset) -> Result<Asset>;

    async fn get(&self, id: AssetId) -> Result<Option<Asset>>;

    async fn get_by_key(&self, storage_key: &str) -> Result<Option<Asset>>;

    /// Atomically move a pending asset to uploaded.
    ///
    /// Fails `NotFound` for an unknown id and `InvalidState` when the asset is
    /// not pending. `size_bytes = None` keeps the stored size.
    async fn mark_uploaded(&self, id: AssetId, size_bytes: Option<u64>) -> Result<Asset>;
}

/// Generation records (append-only)
#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn insert(&self, record: NewGenerationRecord) -> Result<GenerationRecord>;

    async fn get(&self, id: GenerationId) -> Result<Option<GenerationRecord>>;

    /// Newest first
    async fn list_by_owner(
        &self,
        owner: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GenerationRecord>>;

    /// Newest first, optionally bounded by creation time (inclusive)
    async fn list_by_config(
        &self,
        config_id: ConfigId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<GenerationRecord>>;
}
