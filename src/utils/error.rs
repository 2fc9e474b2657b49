//! Error taxonomy for the assistant core, organized by semantic kind rather
//! than by source. Every variant carries its own HTTP mapping so the
//! orchestrator and handlers can propagate a single error type to the API
//! boundary.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding failed: {0}")]
    EmbeddingError(String),

    #[error("vector store failed: {0}")]
    VectorStoreError(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("generation failed: {0}")]
    GenerationError(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String, Option<serde_json::Value>),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    circuit_status: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, retry_after, circuit_status) = match self {
            ApiError::InvalidInput(msg) => {
                tracing::warn!(%msg, "invalid input");
                (StatusCode::BAD_REQUEST, "invalid_input", msg, None, None)
            }
            ApiError::EmbeddingError(msg) => {
                tracing::error!(%msg, "embedding error");
                (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error", msg, None, None)
            }
            ApiError::VectorStoreError(msg) => {
                tracing::error!(%msg, "vector store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "vector_store_error", msg, None, None)
            }
            ApiError::CacheError(msg) => {
                // Cache failures must never surface as user-visible errors; if this
                // variant reaches the HTTP boundary at all it is a programming bug
                // upstream (every caller should have already swallowed it).
                tracing::error!(%msg, "cache error reached HTTP boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error".to_string(), None, None)
            }
            ApiError::GenerationError(msg) => {
                tracing::warn!(%msg, "generation error");
                (StatusCode::OK, "generation_failed", msg, None, None)
            }
            ApiError::ServiceUnavailable(msg, circuit_status) => {
                tracing::warn!(%msg, "service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg, Some(30), circuit_status)
            }
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "unexpected error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "an unexpected error occurred".to_string(), None, None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            retry_after,
            circuit_status,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(
                HeaderName::from_static("retry-after"),
                HeaderValue::from_str(&secs.to_string()).expect("digits are valid header value"),
            );
        }
        response
    }
}
