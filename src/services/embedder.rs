//! Deterministic text -> fixed-dimension vector embedding, with retry and
//! concurrency limiting. Request shape, cache-then-call, and semaphore
//! acquire are carried over from `embedding_service.rs`; retry-with-backoff
//! is new here — the embedding contract calls for 3 attempts with
//! exponential backoff, which the prior cache-then-call path never did.

use crate::config::EmbeddingConfig;
use crate::utils::error::ApiError;
use crate::utils::limiters::Limiters;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderInfo {
    pub model: String,
    pub dim: usize,
}

pub struct Embedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model_name: String,
    pub dimension: usize,
    limiters: Arc<Limiters>,
}

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

impl Embedder {
    pub fn new(config: EmbeddingConfig, limiters: Arc<Limiters>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url,
            api_key: config.api_key,
            model_name: config.model,
            dimension: config.dimension,
            limiters,
        }
    }

    pub fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            model: self.model_name.clone(),
            dim: self.dimension,
        }
    }

    /// Embeds raw query text (no `combine_fields`) — the query-vs-chunk
    /// embedding asymmetry is deliberate, see DESIGN.md Open Question 2.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        self.embed_with_retry(text)
            .await
            .map_err(|e| ApiError::EmbeddingError(e.to_string()))
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError> {
        use futures::future::join_all;

        debug!(count = texts.len(), "embedding batch");

        let futures: Vec<_> = texts.iter().map(|t| self.embed_with_retry(t)).collect();
        let results = join_all(futures).await;

        let mut out = Vec::with_capacity(results.len());
        for r in results {
            out.push(r.map_err(|e| ApiError::EmbeddingError(e.to_string()))?);
        }
        Ok(out)
    }

    /// Cosine similarity between two embeddings, delegating to the shared
    /// `utils::similarity` helper so this and the vector store's own
    /// similarity scoring can't drift apart.
    pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32, ApiError> {
        crate::utils::similarity::cosine_similarity(a, b).map_err(|e| ApiError::EmbeddingError(e.to_string()))
    }

    /// `combine_fields`: concatenates content with scripture references and
    /// tags; excludes title and preacher deliberately (metadata, not
    /// semantic signal). Canonical embedding input for chunks; must be
    /// identical on ingestion and any later re-indexing.
    pub fn combine_fields(content: &str, scripture_refs: Option<&[String]>, tags: Option<&[String]>) -> String {
        let mut parts = vec![content.to_string()];
        if let Some(refs) = scripture_refs {
            if !refs.is_empty() {
                parts.push(refs.join(", "));
            }
        }
        if let Some(tags) = tags {
            if !tags.is_empty() {
                parts.push(tags.join(", "));
            }
        }
        parts.join("\n")
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0u32;
        let mut backoff = BACKOFF_BASE;

        loop {
            attempt += 1;
            match self.embed_once(text).await {
                Ok(vec) => return Ok(vec),
                Err(e) if attempt >= MAX_RETRIES => {
                    return Err(e).context(format!("embedding failed after {attempt} attempts"));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "embedding call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                }
            }
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.embedding.clone(),
            self.limiters.acquire_timeout,
            "embedding",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, "embedding limiter wait");

        let exec_start = Instant::now();

        let request = EmbeddingRequest {
            input: text.to_string(),
            model: self.model_name.clone(),
        };

        let url = format!("{}/v1/embeddings", self.base_url);
        let mut request_builder = self.client.post(&url);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = request_builder
            .json(&request)
            .send()
            .await
            .context("failed to connect to embedding server")?;

        debug!(exec_ms = exec_start.elapsed().as_millis() as u64, "embedding exec");

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("embedding API error ({}): {}", status, body);
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("failed to parse embedding response")?;

        if parsed.data.is_empty() {
            anyhow::bail!("empty data array returned from embedding server");
        }

        let embedding = parsed.data[0].embedding.clone();

        if embedding.is_empty() || embedding.iter().all(|&v| v == 0.0) {
            anyhow::bail!("embedding server returned a zero or empty vector");
        }

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_fields_excludes_title_and_preacher() {
        let combined = Embedder::combine_fields(
            "content body",
            Some(&["Ephesians 2:8-9".to_string()]),
            Some(&["grace".to_string()]),
        );
        assert!(combined.contains("content body"));
        assert!(combined.contains("Ephesians 2:8-9"));
        assert!(combined.contains("grace"));
        assert!(!combined.to_lowercase().contains("preacher"));
    }

    #[test]
    fn combine_fields_handles_missing_optional_fields() {
        let combined = Embedder::combine_fields("just content", None, None);
        assert_eq!(combined, "just content");
    }
}
