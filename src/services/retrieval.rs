//! Embeds the query (via L2), vector-searches (via L3), and partitions
//! results by the relevance threshold. Shape carried over from
//! `services/rag_service.rs::retrieve`/`retrieve_with_embedding`.

use crate::cache::{keys, CacheLayer, CacheTier};
use crate::models::RetrievedChunk;
use crate::services::embedder::Embedder;
use crate::services::vector_store::VectorStore;
use crate::utils::error::ApiError;
use std::sync::Arc;
use tracing::debug;

pub struct RetrievalService {
    embedder: Arc<Embedder>,
    vector_store: Arc<dyn VectorStore>,
    cache: Arc<CacheLayer>,
    top_k: usize,
    relevance_threshold: f32,
}

pub struct RetrievalResult {
    pub high_relevance: Vec<RetrievedChunk>,
    pub low_relevance: Vec<RetrievedChunk>,
    pub query_vec: Vec<f32>,
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<Embedder>,
        vector_store: Arc<dyn VectorStore>,
        cache: Arc<CacheLayer>,
        top_k: usize,
        relevance_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            cache,
            top_k,
            relevance_threshold,
        }
    }

    pub async fn retrieve(&self, query_text: &str, user_id: &str) -> Result<RetrievalResult, ApiError> {
        let vec = self.embed_with_cache(query_text).await?;

        let l3_key = keys::l3_context_key(user_id, &vec);
        let results = match self.cache.get::<Vec<RetrievedChunk>>(CacheTier::L3Context, &l3_key).await {
            Some(cached) => cached,
            None => {
                let fresh = self.vector_store.search(user_id, &vec, self.top_k).await?;
                self.cache.set(CacheTier::L3Context, &l3_key, &fresh).await;
                fresh
            }
        };

        let (mut high, mut low): (Vec<_>, Vec<_>) = results
            .into_iter()
            .partition(|r| r.similarity >= self.relevance_threshold);

        high.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        low.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));

        debug!(user_id, high = high.len(), low = low.len(), "retrieval partitioned");

        Ok(RetrievalResult {
            high_relevance: high,
            low_relevance: low,
            query_vec: vec,
        })
    }

    async fn embed_with_cache(&self, query_text: &str) -> Result<Vec<f32>, ApiError> {
        let l2_key = keys::l2_embedding_key(query_text);
        if let Some(vec) = self.cache.get::<Vec<f32>>(CacheTier::L2Embedding, &l2_key).await {
            return Ok(vec);
        }

        let vec = self.embedder.embed(query_text).await?;
        self.cache.set(CacheTier::L2Embedding, &l2_key, &vec).await;
        Ok(vec)
    }
}
