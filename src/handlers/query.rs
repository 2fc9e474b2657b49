//! `POST /assistant/query`. Extractor shape (axum `State`/`Json`) carried
//! over from `handlers/search.rs`; authentication is an external concern
//! per the interface contract — this handler trusts an already-resolved
//! `X-User-Id` header rather than performing bearer-token resolution
//! itself.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub include_metadata: Option<bool>,
}

pub async fn query_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Response {
    let user_id = match headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_input",
                    "message": "missing X-User-Id header"
                })),
            )
                .into_response();
        }
    };

    let include_metadata = req.include_metadata.unwrap_or(true);

    match state.orchestrator.query(&req.query, &user_id, include_metadata).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => err.into_response(),
    }
}
