//! Citation metadata lookup. The note itself is owned by an external
//! service; this core persists only the fields needed to cite a source —
//! a narrow, read-mostly mirror kept current by the ingestion contract,
//! with a query shape carried over from `database/repository.rs`.
//!
//! Exposed as a trait (mirroring `VectorStore`) so the orchestrator and
//! chunker stay testable against an in-memory fake without a Postgres
//! connection, rather than hard-wiring the concrete `Repository`.

use crate::database::{NoteMetaRow, Repository};
use crate::models::NoteMeta;
use crate::utils::error::ApiError;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait NoteMetaProvider: Send + Sync {
    async fn upsert(&self, meta: &NoteMeta, user_id: &str) -> Result<(), ApiError>;

    /// Missing entries (a note deleted out from under a stale chunk, or a
    /// race with ingestion) are silently omitted — the context assembler
    /// falls back to "Untitled note" for any `note_id` it can't resolve.
    async fn get_many(&self, user_id: &str, note_ids: &[String]) -> Result<HashMap<String, NoteMeta>, ApiError>;
}

pub struct NoteMetaStore {
    repo: Repository,
}

impl NoteMetaStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl NoteMetaProvider for NoteMetaStore {
    async fn upsert(&self, meta: &NoteMeta, user_id: &str) -> Result<(), ApiError> {
        let row = NoteMetaRow {
            note_id: meta.note_id.clone(),
            user_id: user_id.to_string(),
            title: meta.title.clone(),
            preacher: meta.preacher.clone(),
            scripture_refs: meta.scripture_refs.clone(),
            tags: meta.tags.clone(),
        };
        self.repo
            .upsert_note_meta(&row)
            .await
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))
    }

    async fn get_many(&self, user_id: &str, note_ids: &[String]) -> Result<HashMap<String, NoteMeta>, ApiError> {
        let rows = self
            .repo
            .get_notes_meta(user_id, note_ids)
            .await
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.note_id.clone(),
                    NoteMeta {
                        note_id: r.note_id,
                        title: r.title,
                        preacher: r.preacher,
                        scripture_refs: r.scripture_refs,
                        tags: r.tags,
                    },
                )
            })
            .collect())
    }
}
