//! Object storage - presigned URLs, blob persistence and format helpers

pub mod base64;
pub mod local;
pub mod memory;
pub mod presign;
pub mod routes;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

pub use local::LocalObjectStorage;
pub use memory::MemoryObjectStorage;
pub use presign::{SignedMethod, UrlSigner};

/// Bytes plus the content type they were written with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Blob store the asset manager writes to and presigns against
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Time-limited URL a client can PUT the object to
    async fn presign_put(&self, key: &str, content_type: &str, ttl: Duration) -> Result<String>;

    /// Time-limited URL a client can GET the object from
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String>;

    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Build the configured storage backend
pub fn from_config(
    config: &StorageConfig,
    signer: Arc<UrlSigner>,
) -> Result<Arc<dyn ObjectStorage>> {
    let storage: Arc<dyn ObjectStorage> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryObjectStorage::new(signer)),
        StorageBackend::Local => Arc::new(LocalObjectStorage::new(&config.base_path, signer)),
    };
    Ok(storage)
}

/// Image formats recognised by magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
}

impl ImageFormat {
    /// Detect image format from binary data using magic bytes
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }

        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::Webp);
        }

        if data.starts_with(b"BM") {
            return Some(Self::Bmp);
        }

        None
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Bmp => "image/bmp",
        }
    }
}

/// File extension (with dot) for an upload's MIME type; empty when unknown
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "application/pdf" => ".pdf",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        _ => "",
    }
}

/// Best-effort MIME type from a key's extension
pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Keys must be relative and free of parent-directory segments
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key.split('/').all(|segment| !segment.is_empty() && segment != "..")
}
