//! Process-local object storage

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{ObjectStorage, SignedMethod, StoredObject, UrlSigner};
use crate::error::Result;

/// Objects kept in a concurrent map; URLs are signed for the blob routes
pub struct MemoryObjectStorage {
    objects: DashMap<String, StoredObject>,
    signer: Arc<UrlSigner>,
}

impl MemoryObjectStorage {
    pub fn new(signer: Arc<UrlSigner>) -> Self {
        Self {
            objects: DashMap::new(),
            signer,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn presign_put(&self, key: &str, _content_type: &str, ttl: Duration) -> Result<String> {
        self.signer.sign(SignedMethod::Put, key, ttl)
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        self.signer.sign(SignedMethod::Get, key, ttl)
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.objects.get(key).map(|o| o.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.contains_key(key))
    }
}
