//! Thin interface over the vector-capable store — the underlying vector
//! database engine and its indexing algorithm stay out of scope; the core
//! only depends on a user-scoped top-k cosine search primitive. Built on
//! `database/repository.rs` (`sqlx` + `pgvector`), wrapped in a trait so the
//! concrete engine stays a pluggable collaborator.

use crate::database::{ChunkRow, Repository};
use crate::models::{Chunk, RetrievedChunk};
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;
use async_trait::async_trait;
use pgvector::Vector;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_chunks(&self, user_id: &str, note_id: &str, chunks: &[Chunk]) -> Result<(), ApiError>;
    async fn delete_note(&self, user_id: &str, note_id: &str) -> Result<(), ApiError>;
    async fn search(&self, user_id: &str, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, ApiError>;
    async fn user_stats(&self, user_id: &str) -> Result<UserStats, ApiError>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UserStats {
    pub total: i64,
    pub with_embeddings: i64,
}

/// Hard ceiling on `k` regardless of what a caller requests — k is bounded
/// by a config value and must be respected, independent of
/// `ASSISTANT_TOP_K`, which governs the retrieval service's own request
/// size and defaults lower (10).
const MAX_K: usize = 20;

pub struct PgVectorStore {
    repo: Repository,
    limiters: Arc<Limiters>,
    search_timeout: Duration,
}

impl PgVectorStore {
    pub fn new(repo: Repository, limiters: Arc<Limiters>) -> Self {
        Self {
            repo,
            limiters,
            search_timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert_chunks(&self, user_id: &str, note_id: &str, chunks: &[Chunk]) -> Result<(), ApiError> {
        let rows: Vec<ChunkRow> = chunks
            .iter()
            .map(|c| ChunkRow {
                chunk_id: c.chunk_id.clone(),
                note_id: c.note_id.clone(),
                user_id: c.user_id.clone(),
                chunk_idx: c.chunk_idx as i32,
                content: c.text.clone(),
                token_count: c.token_count as i32,
                embedding: Vector::from(c.embedding.clone()),
            })
            .collect();

        self.repo
            .upsert_chunks(note_id, user_id, &rows)
            .await
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))
    }

    async fn delete_note(&self, user_id: &str, note_id: &str) -> Result<(), ApiError> {
        self.repo
            .delete_note(note_id, user_id)
            .await
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))
    }

    async fn search(&self, user_id: &str, query_vec: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, ApiError> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.vector_search.clone(),
            self.limiters.acquire_timeout,
            "vector_search",
        )
        .await
        .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;
        debug!(wait_ms = wait.as_millis() as u64, "vector search limiter wait");

        let k = k.min(MAX_K);
        let vec = Vector::from(query_vec.to_vec());
        let rows = tokio::time::timeout(self.search_timeout, self.repo.search(user_id, vec, k as i64))
            .await
            .map_err(|_| ApiError::VectorStoreError("vector search timed out".into()))?
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;

        let results = rows
            .into_iter()
            .map(|r| RetrievedChunk {
                chunk: Chunk {
                    chunk_id: r.chunk_id,
                    note_id: r.note_id,
                    user_id: r.user_id,
                    chunk_idx: r.chunk_idx as usize,
                    text: r.content,
                    token_count: r.token_count as usize,
                    embedding: Vec::new(),
                },
                similarity: r.similarity,
            })
            .collect::<Vec<_>>();

        // Sorted by decreasing cosine similarity by the query's ORDER BY;
        // re-sort defensively in case a future query shape changes that.
        let mut results = results;
        results.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    async fn user_stats(&self, user_id: &str) -> Result<UserStats, ApiError> {
        let row = self
            .repo
            .user_stats(user_id)
            .await
            .map_err(|e| ApiError::VectorStoreError(e.to_string()))?;
        Ok(UserStats {
            total: row.total,
            with_embeddings: row.with_embeddings,
        })
    }
}
