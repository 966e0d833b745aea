//! Base64 helpers for inline vendor image payloads

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{AppError, Result};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a vendor payload, tolerating a `data:image/...;base64,` prefix and
/// embedded line breaks
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let data = strip_data_url(encoded);
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD
        .decode(compact)
        .map_err(|e| {
            AppError::GenerationFailed(format!("provider returned invalid base64 image: {}", e))
        })
}

/// MIME type declared by a data URL prefix, if any
pub fn data_url_content_type(data_url: &str) -> Option<&str> {
    let rest = data_url.strip_prefix("data:")?;
    let end = rest.find(';')?;
    Some(&rest[..end])
}

fn strip_data_url(encoded: &str) -> &str {
    if encoded.starts_with("data:") {
        encoded.split_once(',').map(|(_, data)| data).unwrap_or(encoded)
    } else {
        encoded
    }
}
