//! Concurrency limiters bounding the number of in-flight calls to each
//! I/O-bound collaborator (embedder, vector store, LLM client), so a burst
//! of requests degrades via queueing rather than by exhausting connection
//! pools or the LLM server's own concurrency limit.

use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct Limiters {
    pub embedding: Arc<Semaphore>,
    pub vector_search: Arc<Semaphore>,
    pub llm_generate: Arc<Semaphore>,
    pub acquire_timeout: Duration,
}

impl Limiters {
    pub fn new(
        embedding_concurrency: usize,
        vector_search_concurrency: usize,
        llm_generate_concurrency: usize,
        acquire_timeout_ms: u64,
    ) -> Self {
        Self {
            embedding: Arc::new(Semaphore::new(embedding_concurrency.max(1))),
            vector_search: Arc::new(Semaphore::new(vector_search_concurrency.max(1))),
            llm_generate: Arc::new(Semaphore::new(llm_generate_concurrency.max(1))),
            acquire_timeout: Duration::from_millis(acquire_timeout_ms.max(1)),
        }
    }

    pub async fn acquire_timed(
        sem: Arc<Semaphore>,
        acquire_timeout: Duration,
        op: &'static str,
    ) -> Result<(OwnedSemaphorePermit, Duration)> {
        let start = Instant::now();

        let permit = tokio::time::timeout(acquire_timeout, sem.acquire_owned())
            .await
            .map_err(|_| anyhow::anyhow!("limiter acquire timeout for op={}", op))??;

        Ok((permit, start.elapsed()))
    }
}
