use pgvector::Vector;
use sqlx::FromRow;

/// Row shape for a persisted chunk, as stored in the `rag_chunks` table.
/// `chunk_id` is `"{note_id}:{chunk_idx}"`, stable across re-chunking runs
/// that preserve ordinal positions and reassigned (by construction) when
/// a note is re-chunked with a different window.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub chunk_id: String,
    pub note_id: String,
    pub user_id: String,
    pub chunk_idx: i32,
    pub content: String,
    pub token_count: i32,
    pub embedding: Vector,
}

/// A row plus the similarity score produced by a `<=>` (cosine distance)
/// nearest-neighbor search.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkSearchRow {
    pub chunk_id: String,
    pub note_id: String,
    pub user_id: String,
    pub chunk_idx: i32,
    pub content: String,
    pub token_count: i32,
    pub similarity: f32,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserStatsRow {
    pub total: i64,
    pub with_embeddings: i64,
}

/// Denormalized note metadata (title, preacher, scripture refs, tags) kept
/// alongside the chunk table purely for citation at answer time — the note
/// itself is owned by an external service; this is a read-only mirror of
/// the fields the ingestion contract hands over.
#[derive(Debug, Clone, FromRow)]
pub struct NoteMetaRow {
    pub note_id: String,
    pub user_id: String,
    pub title: String,
    pub preacher: Option<String>,
    pub scripture_refs: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}
