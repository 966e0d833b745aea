//! In-memory store implementations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use super::{AssetStore, ConfigStore, GenerationStore};
use crate::error::{AppError, Result};
use crate::models::{
    Asset, AssetId, AssetStatus, ConfigId, GenerationId, GenerationRecord, NewAsset,
    NewGenerationRecord, ProviderConfig, ProviderConfigPatch, UserId,
};

/// Provider configs held in a map keyed by id
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: RwLock<BTreeMap<ConfigId, ProviderConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configs(configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        let store = Self::new();
        for config in configs {
            store.upsert(config);
        }
        store
    }

    /// Insert or replace a config
    pub fn upsert(&self, config: ProviderConfig) {
        self.configs.write().insert(config.id, config);
    }

    pub fn remove(&self, id: ConfigId) -> Option<ProviderConfig> {
        self.configs.write().remove(&id)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn list_enabled(&self, service_kind: &str) -> Result<Vec<ProviderConfig>> {
        let mut configs: Vec<ProviderConfig> = self
            .configs
            .read()
            .values()
            .filter(|c| c.enabled && c.service_kind == service_kind)
            .cloned()
            .collect();
        // Ties keep id order so resolution stays deterministic
        configs.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(configs)
    }

    async fn get(&self, id: ConfigId) -> Result<Option<ProviderConfig>> {
        Ok(self.configs.read().get(&id).cloned())
    }

    async fn update(&self, id: ConfigId, patch: ProviderConfigPatch) -> Result<ProviderConfig> {
        let mut configs = self.configs.write();
        let config = configs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("provider config {}", id)))?;
        patch.apply(config);
        Ok(config.clone())
    }
}

/// Asset rows with a unique storage-key index
pub struct MemoryAssetStore {
    rows: DashMap<AssetId, Asset>,
    by_key: DashMap<String, AssetId>,
    next_id: AtomicI64,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            by_key: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn create(&self, asset: NewAsset) -> Result<Asset> {
        match self.by_key.entry(asset.storage_key.clone()) {
            Entry::Occupied(_) => Err(AppError::InvalidRequest(format!(
                "storage key already in use: {}",
                asset.storage_key
            ))),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let row = Asset {
                    id,
                    storage_key: asset.storage_key,
                    content_type: asset.content_type,
                    size_bytes: asset.size_bytes,
                    status: asset.status,
                    owner_user_id: asset.owner_user_id,
                    created_at: Utc::now(),
                };
                slot.insert(id);
                self.rows.insert(id, row.clone());
                Ok(row)
            }
        }
    }

    async fn get(&self, id: AssetId) -> Result<Option<Asset>> {
        Ok(self.rows.get(&id).map(|row| row.clone()))
    }

    async fn get_by_key(&self, storage_key: &str) -> Result<Option<Asset>> {
        let Some(id) = self.by_key.get(storage_key).map(|id| *id) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn mark_uploaded(&self, id: AssetId, size_bytes: Option<u64>) -> Result<Asset> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("asset {}", id)))?;

        if row.status != AssetStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "asset {} is already confirmed",
                id
            )));
        }

        row.status = AssetStatus::Uploaded;
        if size_bytes.is_some() {
            row.size_bytes = size_bytes;
        }
        Ok(row.clone())
    }
}

/// Append-only generation records
pub struct MemoryGenerationStore {
    records: RwLock<Vec<GenerationRecord>>,
    next_id: AtomicI64,
}

impl MemoryGenerationStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryGenerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationStore for MemoryGenerationStore {
    async fn insert(&self, record: NewGenerationRecord) -> Result<GenerationRecord> {
        let row = GenerationRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            owner_user_id: record.owner_user_id,
            asset_id: record.asset_id,
            kind: record.kind,
            prompt: record.prompt,
            negative_prompt: record.negative_prompt,
            provider_kind: record.provider_kind,
            model_used: record.model_used,
            config_id_used: record.config_id_used,
            parameters: record.parameters,
            metadata: record.metadata,
            cost_estimate: record.cost_estimate,
            status: record.status,
            source_asset_id: record.source_asset_id,
            created_at: Utc::now(),
        };
        self.records.write().push(row.clone());
        Ok(row)
    }

    async fn get(&self, id: GenerationId) -> Result<Option<GenerationRecord>> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn list_by_owner(
        &self,
        owner: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GenerationRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| r.owner_user_id == owner)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_by_config(
        &self,
        config_id: ConfigId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<GenerationRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .rev()
            .filter(|r| r.config_id_used == config_id)
            .filter(|r| from.map_or(true, |from| r.created_at >= from))
            .filter(|r| to.map_or(true, |to| r.created_at <= to))
            .cloned()
            .collect())
    }
}
