//! Internal ingestion endpoint invoked by the Note service, not end users.
//! Fire-and-forget from the caller's
//! perspective: a `202` is returned once the note is queued, the actual
//! chunk/embed/persist work runs inline on this request but its failure
//! modes are logged rather than retried by the caller.

use crate::services::NoteForIngestion;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NoteWrittenRequest {
    pub user_id: String,
    pub note_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub preacher: Option<String>,
    #[serde(default)]
    pub scripture_refs: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

pub async fn on_note_written(State(state): State<AppState>, Json(req): Json<NoteWrittenRequest>) -> impl IntoResponse {
    let note = NoteForIngestion {
        user_id: req.user_id,
        note_id: req.note_id,
        title: req.title,
        content: req.content,
        preacher: req.preacher,
        scripture_refs: req.scripture_refs,
        tags: req.tags,
    };

    match state.chunker.on_note_written(note).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => err.into_response(),
    }
}
