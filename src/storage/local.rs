//! Filesystem-backed object storage

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use super::{
    content_type_for_key, is_safe_key, ObjectStorage, SignedMethod, StoredObject, UrlSigner,
};
use crate::error::{AppError, Result};

/// Stores each object as a file under a root directory, keyed by its path
pub struct LocalObjectStorage {
    storage_path: PathBuf,
    signer: Arc<UrlSigner>,
}

impl LocalObjectStorage {
    pub fn new(storage_path: impl Into<PathBuf>, signer: Arc<UrlSigner>) -> Self {
        Self {
            storage_path: storage_path.into(),
            signer,
        }
    }

    /// Full path for a key; rejects keys that could escape the root
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_safe_key(key) {
            return Err(AppError::InvalidRequest(format!("invalid object key: {}", key)));
        }
        Ok(self.storage_path.join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn presign_put(&self, key: &str, _content_type: &str, ttl: Duration) -> Result<String> {
        self.path_for(key)?;
        self.signer.sign(SignedMethod::Put, key, ttl)
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        self.path_for(key)?;
        self.signer.sign(SignedMethod::Get, key, ttl)
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        let file_path = self.path_for(key)?;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&file_path, &bytes).await?;

        debug!(path = ?file_path, size = bytes.len(), "Saved object file");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        let file_path = self.path_for(key)?;
        match fs::read(&file_path).await {
            Ok(bytes) => Ok(Some(StoredObject {
                bytes,
                content_type: content_type_for_key(key).to_string(),
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let file_path = self.path_for(key)?;
        match fs::metadata(file_path).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AppError::Io(err)),
        }
    }
}
