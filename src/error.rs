//! Common error types for the orchestration core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("No available provider: {0}")]
    Unavailable(String),

    #[error("Rate limit exceeded for config {0}")]
    RateLimited(i64),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable tag for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Json(_) => "json",
            AppError::HttpClient(_) => "http_client",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Unavailable(_) => "unavailable",
            AppError::RateLimited(_) => "rate_limited",
            AppError::GenerationFailed(_) => "generation_failed",
            AppError::InvalidState(_) => "invalid_state",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Storage(_) => "storage",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Error response format
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            AppError::Json(_) | AppError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            AppError::HttpClient(_) | AppError::GenerationFailed(_) => {
                (StatusCode::BAD_GATEWAY, "provider_error")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found_error"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "permission_error"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "server_error"),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
            AppError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state_error"),
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: Some(self.kind().to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
