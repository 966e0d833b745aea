//! Asset lifecycle: presigned upload slots, confirmation, read URLs and
//! ingestion of generated images

use chrono::{Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::models::{Asset, AssetId, AssetStatus, NewAsset, UserId};
use crate::storage::{extension_for_content_type, ObjectStorage};
use crate::store::AssetStore;

const MIN_READ_TTL_SECS: u64 = 60;
const MAX_READ_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const ALLOWED_KEY_PREFIXES: [&str; 2] = ["uploads/", "generated/"];

/// Presigned upload target handed to a client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    pub asset_id: AssetId,
    pub storage_key: String,
    pub put_url: String,
    pub expires_in: u64,
}

/// Time-limited read access to an uploaded asset
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadUrl {
    pub asset_id: AssetId,
    pub storage_key: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: Option<u64>,
}

/// Asset written from generated bytes, with a URL to read it back
#[derive(Debug, Clone)]
pub struct IngestedAsset {
    pub asset: Asset,
    pub url: String,
}

/// How a caller names an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    Id(AssetId),
    Key(String),
}

impl From<AssetId> for AssetRef {
    fn from(id: AssetId) -> Self {
        AssetRef::Id(id)
    }
}

/// Owns the pending → uploaded lifecycle of binary assets
pub struct AssetManager {
    assets: Arc<dyn AssetStore>,
    storage: Arc<dyn ObjectStorage>,
    upload_ttl: Duration,
    read_ttl_secs: u64,
    verify_on_confirm: bool,
}

impl AssetManager {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        storage: Arc<dyn ObjectStorage>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            assets,
            storage,
            upload_ttl: Duration::from_secs(config.upload_url_ttl_secs),
            read_ttl_secs: config.read_url_ttl_secs,
            verify_on_confirm: config.verify_on_confirm,
        }
    }

    /// Create a pending asset and a presigned PUT URL for it
    pub async fn issue_upload_slot(
        &self,
        content_type: &str,
        owner: Option<UserId>,
    ) -> Result<UploadSlot> {
        let now = Utc::now();
        let storage_key = format!(
            "uploads/{}/{}/{}{}",
            now.year(),
            now.month(),
            Uuid::new_v4(),
            extension_for_content_type(content_type)
        );

        let asset = self
            .assets
            .create(NewAsset {
                storage_key: storage_key.clone(),
                content_type: content_type.to_string(),
                size_bytes: None,
                status: AssetStatus::Pending,
                owner_user_id: owner,
            })
            .await?;

        let put_url = self
            .storage
            .presign_put(&storage_key, content_type, self.upload_ttl)
            .await?;

        info!(asset_id = asset.id, key = %storage_key, "Issued upload slot");
        Ok(UploadSlot {
            asset_id: asset.id,
            storage_key,
            put_url,
            expires_in: self.upload_ttl.as_secs(),
        })
    }

    /// Mark a pending upload as done. Succeeds at most once per asset.
    pub async fn confirm_upload(
        &self,
        asset_id: AssetId,
        caller: UserId,
        size_bytes: Option<u64>,
    ) -> Result<Asset> {
        let asset = self.owned_asset(asset_id, caller).await?;

        if asset.status != AssetStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "asset {} is already confirmed",
                asset_id
            )));
        }

        if self.verify_on_confirm && !self.storage.exists(&asset.storage_key).await? {
            warn!(asset_id = asset_id, key = %asset.storage_key, "Confirm for missing object");
            return Err(AppError::InvalidState(format!(
                "no object has been uploaded for asset {}",
                asset_id
            )));
        }

        let asset = self.assets.mark_uploaded(asset_id, size_bytes).await?;
        info!(asset_id = asset_id, size = ?asset.size_bytes, "Confirmed upload");
        Ok(asset)
    }

    /// Presigned GET URL for an uploaded asset. `ttl_secs` defaults to the
    /// configured read TTL and is clamped to one minute .. seven days.
    pub async fn issue_read_url(
        &self,
        asset_ref: AssetRef,
        caller: UserId,
        ttl_secs: Option<u64>,
    ) -> Result<ReadUrl> {
        let asset = match &asset_ref {
            AssetRef::Id(id) => self.assets.get(*id).await?,
            AssetRef::Key(key) => {
                if !is_allowed_key(key) {
                    return Err(AppError::InvalidRequest(format!("invalid storage key: {}", key)));
                }
                self.assets.get_by_key(key).await?
            }
        }
        .ok_or_else(|| AppError::NotFound(format!("asset {:?}", asset_ref)))?;

        if asset.status != AssetStatus::Uploaded {
            return Err(AppError::Unauthorized(format!(
                "asset {} has not been uploaded",
                asset.id
            )));
        }
        if !asset.is_accessible_by(caller) {
            return Err(AppError::Forbidden(format!("asset {} belongs to another user", asset.id)));
        }

        let url = if asset.is_external() {
            asset.storage_key.clone()
        } else {
            let ttl = ttl_secs
                .unwrap_or(self.read_ttl_secs)
                .clamp(MIN_READ_TTL_SECS, MAX_READ_TTL_SECS);
            self.storage
                .presign_get(&asset.storage_key, Duration::from_secs(ttl))
                .await?
        };

        Ok(ReadUrl {
            asset_id: asset.id,
            storage_key: asset.storage_key,
            url,
            content_type: asset.content_type,
            size_bytes: asset.size_bytes,
        })
    }

    /// Write generated bytes under `generated/` and record them as uploaded
    pub async fn ingest_generated_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
        owner: Option<UserId>,
    ) -> Result<IngestedAsset> {
        let now = Utc::now();
        let storage_key = format!("generated/{}/{}/{}", now.year(), now.month(), filename);
        let size = bytes.len() as u64;

        // Claim the key before writing so an existing object is never replaced
        let pending = self
            .assets
            .create(NewAsset {
                storage_key: storage_key.clone(),
                content_type: content_type.to_string(),
                size_bytes: Some(size),
                status: AssetStatus::Pending,
                owner_user_id: owner,
            })
            .await?;

        self.storage
            .put_object(&storage_key, bytes, content_type)
            .await?;
        let asset = self.assets.mark_uploaded(pending.id, Some(size)).await?;

        let url = self
            .storage
            .presign_get(&storage_key, Duration::from_secs(self.read_ttl_secs))
            .await?;

        debug!(asset_id = asset.id, key = %storage_key, size = size, "Ingested generated image");
        Ok(IngestedAsset { asset, url })
    }

    /// Record a vendor-hosted image without copying it
    pub async fn register_external(
        &self,
        url: &str,
        content_type: &str,
        owner: Option<UserId>,
    ) -> Result<Asset> {
        let asset = self
            .assets
            .create(NewAsset {
                storage_key: url.to_string(),
                content_type: content_type.to_string(),
                size_bytes: None,
                status: AssetStatus::Uploaded,
                owner_user_id: owner,
            })
            .await?;
        debug!(asset_id = asset.id, "Registered external image");
        Ok(asset)
    }

    /// Ownership-checked lookup
    pub async fn get_asset(&self, asset_id: AssetId, caller: UserId) -> Result<Asset> {
        self.owned_asset(asset_id, caller).await
    }

    async fn owned_asset(&self, asset_id: AssetId, caller: UserId) -> Result<Asset> {
        let asset = self
            .assets
            .get(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("asset {}", asset_id)))?;

        if !asset.is_accessible_by(caller) {
            return Err(AppError::Forbidden(format!("asset {} belongs to another user", asset_id)));
        }
        Ok(asset)
    }
}

fn is_allowed_key(key: &str) -> bool {
    !key.contains("..") && ALLOWED_KEY_PREFIXES.iter().any(|p| key.starts_with(p))
}
