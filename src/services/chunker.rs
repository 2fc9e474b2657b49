//! Ingestion path: chunk a note's canonical text and drive the embedder on
//! note write. Sliding-window shape carried over from `document/chunker.rs`
//! (reworked from char-bounded to token-bounded per the tokenizer contract)
//! and `services/document_service.rs`'s pipeline shape (parse -> chunk ->
//! embed batch -> persist), minus the file-format parsing step — this core
//! receives already-extracted `canonical_text`, not raw bytes.

use crate::cache::CacheLayer;
use crate::config::AssistantConfig;
use crate::models::{Chunk, NoteMeta};
use crate::services::embedder::Embedder;
use crate::services::note_meta::NoteMetaProvider;
use crate::services::tokenizer::Tokenizer;
use crate::services::vector_store::VectorStore;
use crate::utils::error::ApiError;
use std::sync::Arc;
use tracing::{info, warn};

/// Note fields relevant to ingestion; `title`/`preacher` are mirrored into
/// `rag_note_meta` for citation but never enter the embedding input (see
/// `combine_fields`).
pub struct NoteForIngestion {
    pub user_id: String,
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub preacher: Option<String>,
    pub scripture_refs: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// Bulk-chunking threshold past which the CPU-bound tokenizer work is
/// offloaded to a blocking thread so it doesn't starve the event loop.
const BLOCKING_THRESHOLD_CHARS: usize = 20_000;

pub struct ChunkerService {
    embedder: Arc<Embedder>,
    vector_store: Arc<dyn VectorStore>,
    note_meta: Arc<dyn NoteMetaProvider>,
    cache: Arc<CacheLayer>,
    config: AssistantConfig,
}

impl ChunkerService {
    pub fn new(
        embedder: Arc<Embedder>,
        vector_store: Arc<dyn VectorStore>,
        note_meta: Arc<dyn NoteMetaProvider>,
        cache: Arc<CacheLayer>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            note_meta,
            cache,
            config,
        }
    }

    /// `on_note_written` contract: fire-and-forget, internally idempotent —
    /// running this twice for the same note's content yields the same final
    /// chunk set because the vector store upsert is an atomic replace.
    pub async fn on_note_written(&self, note: NoteForIngestion) -> Result<(), ApiError> {
        let canonical_text = Embedder::combine_fields(
            &note.content,
            note.scripture_refs.as_deref(),
            note.tags.as_deref(),
        );

        let meta = NoteMeta {
            note_id: note.note_id.clone(),
            title: note.title.clone(),
            preacher: note.preacher.clone(),
            scripture_refs: note.scripture_refs.clone(),
            tags: note.tags.clone(),
        };
        self.note_meta.upsert(&meta, &note.user_id).await?;

        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let chunk_texts = if canonical_text.len() > BLOCKING_THRESHOLD_CHARS {
            let text = canonical_text.clone();
            tokio::task::spawn_blocking(move || Tokenizer::chunk(&text, chunk_size, overlap))
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?
        } else {
            Tokenizer::chunk(&canonical_text, chunk_size, overlap)
        }
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

        if chunk_texts.is_empty() {
            warn!(note_id = %note.note_id, "note produced zero chunks, nothing to embed");
            self.vector_store.delete_note(&note.user_id, &note.note_id).await?;
            self.cache.invalidate_user_context(&note.user_id).await;
            return Ok(());
        }

        let vecs = self.embedder.embed_batch(chunk_texts.clone()).await?;

        let chunks: Vec<Chunk> = chunk_texts
            .into_iter()
            .zip(vecs.into_iter())
            .enumerate()
            .map(|(idx, (text, embedding))| Chunk {
                chunk_id: format!("{}:{}", note.note_id, idx),
                note_id: note.note_id.clone(),
                user_id: note.user_id.clone(),
                chunk_idx: idx,
                token_count: Tokenizer::count(&text),
                text,
                embedding,
            })
            .collect();

        self.vector_store
            .upsert_chunks(&note.user_id, &note.note_id, &chunks)
            .await?;

        // L3 invalidation happens after the upsert commits — readers may
        // observe stale L3 briefly, bounded by its TTL, never a
        // partially-replaced chunk set.
        self.cache.invalidate_user_context(&note.user_id).await;

        info!(note_id = %note.note_id, chunk_count = chunks.len(), "ingested note");
        Ok(())
    }
}
