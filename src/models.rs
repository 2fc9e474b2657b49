//! Domain entities shared across the retrieval, assembly, and orchestration
//! layers. Modeled as tagged, fixed-shape structs rather than duck-typed
//! maps — `similarity` only exists on a retrieved chunk, never on a chunk
//! at rest, so the two are distinct types rather than one struct with an
//! optional field doing double duty.

use serde::{Deserialize, Serialize};

/// A retrieval unit derived from a note. `user_id` is denormalized onto the
/// chunk so every filter can be expressed without a join back to the note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub note_id: String,
    pub user_id: String,
    pub chunk_idx: usize,
    pub text: String,
    pub token_count: usize,
    pub embedding: Vec<f32>,
}

/// A chunk plus the similarity score it was retrieved with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Metadata for a note's chunk owner, carried alongside assembled context so
/// the assembler can cite a title without re-querying the note store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMeta {
    pub note_id: String,
    pub title: String,
    pub preacher: Option<String>,
    pub scripture_refs: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub note_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preacher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripture_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBuildResult {
    pub context_text: String,
    pub sources: Vec<Source>,
    pub chunks_used: usize,
    pub chunks_skipped: usize,
    pub context_tokens: usize,
    pub context_truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_retrieved: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_used: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_skipped: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_context: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_l1_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_fallback: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<QueryResponseMetadata>,
}
