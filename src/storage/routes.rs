//! Blob routes backing the built-in object storage's presigned URLs
//!
//! Requests are authorized by the signed query string alone; no asset state
//! is touched here. Uploads still have to be confirmed through the asset
//! manager.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

use super::{content_type_for_key, ObjectStorage, SignedMethod, UrlSigner};
use crate::error::{AppError, Result};

#[derive(Clone)]
struct BlobState {
    storage: Arc<dyn ObjectStorage>,
    signer: Arc<UrlSigner>,
}

#[derive(Debug, Deserialize)]
struct SignedQuery {
    expires: i64,
    signature: String,
}

/// Router serving `GET`/`PUT /objects/{key}`
pub fn router(storage: Arc<dyn ObjectStorage>, signer: Arc<UrlSigner>) -> Router {
    Router::new()
        .route("/objects/*key", get(get_object).put(put_object))
        .with_state(BlobState { storage, signer })
        .layer(TraceLayer::new_for_http())
}

async fn get_object(
    State(state): State<BlobState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<Response> {
    let key = key.trim_start_matches('/');
    state
        .signer
        .verify(SignedMethod::Get, key, query.expires, &query.signature)?;

    let object = state
        .storage
        .get_object(key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("object {}", key)))?;

    Ok(([(header::CONTENT_TYPE, object.content_type)], object.bytes).into_response())
}

async fn put_object(
    State(state): State<BlobState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let key = key.trim_start_matches('/');
    state
        .signer
        .verify(SignedMethod::Put, key, query.expires, &query.signature)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_else(|| content_type_for_key(key))
        .to_string();

    debug!(key = %key, size = body.len(), "Receiving object upload");
    state
        .storage
        .put_object(key, body.to_vec(), &content_type)
        .await?;

    Ok(StatusCode::OK)
}
