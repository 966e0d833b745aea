//! Presigned URL signing and verification
//!
//! URLs take the form `{public_url}/objects/{key}?expires={unix}&signature={hex}`
//! where the signature is SHA-256 over method, key, expiry and the secret.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

use crate::error::{AppError, Result};

const OBJECTS_SEGMENT: &str = "objects";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedMethod {
    Get,
    Put,
}

impl SignedMethod {
    fn as_str(&self) -> &'static str {
        match self {
            SignedMethod::Get => "GET",
            SignedMethod::Put => "PUT",
        }
    }
}

/// Issues and checks signed blob URLs
pub struct UrlSigner {
    base_url: Url,
    secret: String,
}

impl UrlSigner {
    pub fn new(public_url: &str, secret: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(public_url).map_err(|e| {
            AppError::Config(config::ConfigError::Message(format!(
                "invalid storage public_url '{}': {}",
                public_url, e
            )))
        })?;
        Ok(Self {
            base_url,
            secret: secret.into(),
        })
    }

    /// Signed URL for `key` valid for `ttl` from now
    pub fn sign(&self, method: SignedMethod, key: &str, ttl: Duration) -> Result<String> {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        self.sign_with_expiry(method, key, expires)
    }

    fn sign_with_expiry(&self, method: SignedMethod, key: &str, expires: i64) -> Result<String> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Storage("public_url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(OBJECTS_SEGMENT)
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.signature(method, key, expires));
        Ok(url.to_string())
    }

    fn signature(&self, method: SignedMethod, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check a signature for `key`
    pub fn verify(
        &self,
        method: SignedMethod,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<()> {
        if expires < Utc::now().timestamp() {
            return Err(AppError::Unauthorized("signed URL has expired".to_string()));
        }
        if self.signature(method, key, expires) != signature.to_ascii_lowercase() {
            return Err(AppError::Unauthorized("signature mismatch".to_string()));
        }
        Ok(())
    }

    /// Verify a full signed URL and return the object key it grants
    pub fn verify_url(&self, method: SignedMethod, signed_url: &str) -> Result<String> {
        let url = Url::parse(signed_url)
            .map_err(|e| AppError::InvalidRequest(format!("malformed URL: {}", e)))?;

        let base_depth = self
            .base_url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).count())
            .unwrap_or(0);
        let mut segments = url
            .path_segments()
            .ok_or_else(|| AppError::InvalidRequest("URL has no path".to_string()))?
            .skip(base_depth);
        if segments.next() != Some(OBJECTS_SEGMENT) {
            return Err(AppError::InvalidRequest(
                "URL does not point at an object".to_string(),
            ));
        }
        let key = segments.collect::<Vec<_>>().join("/");

        let mut expires = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }
        let (Some(expires), Some(signature)) = (expires, signature) else {
            return Err(AppError::Unauthorized("URL is not signed".to_string()));
        };

        self.verify(method, &key, expires, &signature)?;
        Ok(key)
    }
}
