//! The seven-step query pipeline. Top-level shape (retrieve -> assemble ->
//! generate -> format) carried over from `services/rag_service.rs::answer_query`,
//! generalized with the cache short-circuit, no-context branch, and
//! circuit-breaker fallback ladder this contract adds.

use crate::cache::{keys, CacheLayer, CacheTier};
use crate::logging::{ActivityKind, ActivityStatus, Counters};
use crate::models::{QueryResponse, QueryResponseMetadata, Source};
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::context_assembler::ContextAssembler;
use crate::services::llm_client::LlmClient;
use crate::services::note_meta::NoteMetaProvider;
use crate::services::prompt_engine::PromptEngine;
use crate::services::retrieval::RetrievalService;
use crate::utils::error::ApiError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Rough per-generation cost avoided by an L1 hit, for the cache-stats
/// endpoint's `cost_saved_usd` figure. Not tied to a real pricing table —
/// a coarse constant is enough to make the counter move meaningfully
/// without wiring a billing dependency into this core.
const ESTIMATED_GENERATION_COST_CENTS: u64 = 1;

pub struct Orchestrator {
    retrieval: Arc<RetrievalService>,
    note_meta: Arc<dyn NoteMetaProvider>,
    cache: Arc<CacheLayer>,
    breaker: Arc<CircuitBreaker>,
    llm: Arc<LlmClient>,
    counters: Arc<Counters>,
    context_budget: usize,
    query_max_tokens: usize,
    max_sources: usize,
}

impl Orchestrator {
    pub fn new(
        retrieval: Arc<RetrievalService>,
        note_meta: Arc<dyn NoteMetaProvider>,
        cache: Arc<CacheLayer>,
        breaker: Arc<CircuitBreaker>,
        llm: Arc<LlmClient>,
        counters: Arc<Counters>,
        context_budget: usize,
        query_max_tokens: usize,
        max_sources: usize,
    ) -> Self {
        Self {
            retrieval,
            note_meta,
            cache,
            breaker,
            llm,
            counters,
            context_budget,
            query_max_tokens,
            max_sources,
        }
    }

    pub async fn query(&self, user_query: &str, user_id: &str, include_metadata: bool) -> Result<QueryResponse, ApiError> {
        let start = Instant::now();

        // A budget of 0 is a misconfiguration, not a request this pipeline
        // can usefully degrade from — fail closed rather than silently
        // producing an always-empty context.
        if self.context_budget == 0 {
            return Err(ApiError::InvalidInput("context budget must be > 0".into()));
        }

        // 1. Validate & tokenize.
        let (clean_q, query_truncated, query_tokens) = PromptEngine::prepare_query(user_query, self.query_max_tokens);
        if clean_q.is_empty() {
            return Err(ApiError::InvalidInput("query must not be empty".into()));
        }
        info!(
            user_id,
            kind = ActivityKind::QueryReceived.as_str(),
            status = ActivityStatus::Success.as_str(),
            query_tokens,
            "query received"
        );

        // 2. Retrieve.
        let retrieval = self.retrieval.retrieve(&clean_q, user_id).await?;
        let chunks_retrieved = retrieval.high_relevance.len() + retrieval.low_relevance.len();
        info!(
            user_id,
            kind = ActivityKind::Retrieved.as_str(),
            status = ActivityStatus::Success.as_str(),
            high = retrieval.high_relevance.len(),
            low = retrieval.low_relevance.len(),
            "retrieved"
        );

        // 3. L1 short-circuit.
        let mut context_ids: Vec<String> = retrieval
            .high_relevance
            .iter()
            .chain(retrieval.low_relevance.iter())
            .map(|r| r.chunk.chunk_id.clone())
            .collect();
        context_ids.sort();
        let l1_key = keys::l1_query_key(user_id, &clean_q, context_ids.clone());

        if let Some(mut cached) = self.cache.get::<QueryResponse>(CacheTier::L1Query, &l1_key).await {
            info!(
                user_id,
                kind = ActivityKind::L1CacheHit.as_str(),
                status = ActivityStatus::Success.as_str(),
                "l1 cache hit"
            );
            self.cache.record_generation_cost_saved(ESTIMATED_GENERATION_COST_CENTS);
            if let Some(meta) = cached.metadata.as_mut() {
                meta.from_l1_cache = Some(true);
                meta.duration_ms = Some(start.elapsed().as_millis() as u64);
            }
            return Ok(cached);
        }

        // 4. Assemble context.
        let note_ids: Vec<String> = {
            let mut ids: Vec<String> = retrieval.high_relevance.iter().map(|r| r.chunk.note_id.clone()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let notes = self.note_meta.get_many(user_id, &note_ids).await?;
        let build = ContextAssembler::build(&retrieval.high_relevance, &notes, self.context_budget);
        info!(
            user_id,
            kind = ActivityKind::ContextAssembled.as_str(),
            status = ActivityStatus::Success.as_str(),
            chunks_used = build.chunks_used,
            chunks_skipped = build.chunks_skipped,
            context_tokens = build.context_tokens,
            "context assembled"
        );

        // 5. No-context branch.
        if build.context_text.is_empty() {
            info!(
                user_id,
                kind = ActivityKind::NoContext.as_str(),
                status = ActivityStatus::Success.as_str(),
                "no context available"
            );
            return Ok(QueryResponse {
                answer: PromptEngine::build_no_context_response(),
                sources: Vec::new(),
                metadata: include_metadata.then(|| QueryResponseMetadata {
                    query_tokens: Some(query_tokens),
                    query_truncated: Some(query_truncated),
                    chunks_retrieved: Some(chunks_retrieved),
                    no_context: Some(true),
                    duration_ms: Some(start.elapsed().as_millis() as u64),
                    ..Default::default()
                }),
            });
        }

        // 6. Generate.
        let prompt = PromptEngine::build_prompt(&clean_q, &build.context_text);

        let response = if self.breaker.allow_request() {
            match self.llm.generate(&prompt).await {
                Ok(answer) => {
                    self.breaker.record_success();
                    Counters::inc(&self.counters.generations);
                    info!(
                        user_id,
                        kind = ActivityKind::Generated.as_str(),
                        status = ActivityStatus::Success.as_str(),
                        "generated"
                    );
                    Some(self.format_success(
                        answer,
                        build.sources.clone(),
                        query_tokens,
                        query_truncated,
                        chunks_retrieved,
                        &build,
                        start,
                    ))
                }
                Err(ApiError::GenerationError(msg)) => {
                    self.breaker.record_failure();
                    Counters::inc(&self.counters.generation_failures);
                    warn!(
                        user_id,
                        error = %msg,
                        kind = ActivityKind::GenerationFailed.as_str(),
                        status = ActivityStatus::Warning.as_str(),
                        "generation failed"
                    );
                    Some(self.format_generation_failure(build.sources.clone(), query_tokens, query_truncated, chunks_retrieved, &build, start))
                }
                Err(other) => return Err(other),
            }
        } else {
            warn!(
                user_id,
                kind = ActivityKind::CircuitOpen.as_str(),
                status = ActivityStatus::Warning.as_str(),
                "circuit breaker open, rejecting call"
            );
            Counters::inc(&self.counters.circuit_rejections);
            self.fallback_ladder(user_id, &l1_key, &retrieval.high_relevance, query_tokens, query_truncated, chunks_retrieved, &build, start)
                .await?
        };

        let response = match response {
            Some(r) => r,
            None => unreachable!("every generate branch produces a response"),
        };

        // 7. Format & cache. Only a successful generation writes L1 — the
        // generation-failure and fallback branches deliberately skip it so
        // a transient failure doesn't poison the cache for later callers.
        let meta = response.metadata.as_ref();
        let is_cacheable = meta.and_then(|m| m.error.clone()).is_none()
            && !meta.and_then(|m| m.from_fallback).unwrap_or(false)
            && !meta.and_then(|m| m.no_context).unwrap_or(false);
        if is_cacheable {
            self.cache.set(CacheTier::L1Query, &l1_key, &response).await;
        }

        Ok(response)
    }

    fn format_success(
        &self,
        answer: String,
        mut sources: Vec<Source>,
        query_tokens: usize,
        query_truncated: bool,
        chunks_retrieved: usize,
        build: &crate::models::ContextBuildResult,
        start: Instant,
    ) -> QueryResponse {
        sources.truncate(self.max_sources);
        QueryResponse {
            answer,
            sources,
            metadata: Some(QueryResponseMetadata {
                query_tokens: Some(query_tokens),
                query_truncated: Some(query_truncated),
                context_tokens: Some(build.context_tokens),
                context_truncated: Some(build.context_truncated),
                chunks_retrieved: Some(chunks_retrieved),
                chunks_used: Some(build.chunks_used),
                chunks_skipped: Some(build.chunks_skipped),
                duration_ms: Some(start.elapsed().as_millis() as u64),
                ..Default::default()
            }),
        }
    }

    fn format_generation_failure(
        &self,
        mut sources: Vec<Source>,
        query_tokens: usize,
        query_truncated: bool,
        chunks_retrieved: usize,
        build: &crate::models::ContextBuildResult,
        start: Instant,
    ) -> QueryResponse {
        sources.truncate(self.max_sources);
        QueryResponse {
            answer: "I ran into trouble putting together an answer just now. The sources below \
                      are what I found in your notes; you may want to try again shortly."
                .to_string(),
            sources,
            metadata: Some(QueryResponseMetadata {
                query_tokens: Some(query_tokens),
                query_truncated: Some(query_truncated),
                context_tokens: Some(build.context_tokens),
                context_truncated: Some(build.context_truncated),
                chunks_retrieved: Some(chunks_retrieved),
                chunks_used: Some(build.chunks_used),
                chunks_skipped: Some(build.chunks_skipped),
                duration_ms: Some(start.elapsed().as_millis() as u64),
                error: Some("generation_failed".to_string()),
                ..Default::default()
            }),
        }
    }

    /// Step 6's fallback ladder when the breaker is `OPEN`: a second L1
    /// probe (a concurrent request may have already populated it), then an
    /// excerpts-only fallback, then surfacing `ServiceUnavailable`.
    async fn fallback_ladder(
        &self,
        user_id: &str,
        l1_key: &str,
        high_relevance: &[crate::models::RetrievedChunk],
        query_tokens: usize,
        query_truncated: bool,
        chunks_retrieved: usize,
        build: &crate::models::ContextBuildResult,
        start: Instant,
    ) -> Result<Option<QueryResponse>, ApiError> {
        if let Some(mut cached) = self.cache.get::<QueryResponse>(CacheTier::L1Query, l1_key).await {
            Counters::inc(&self.counters.fallbacks_l1);
            info!(
                user_id,
                kind = ActivityKind::FallbackL1.as_str(),
                status = ActivityStatus::Warning.as_str(),
                "fallback: l1 cache hit"
            );
            self.cache.record_generation_cost_saved(ESTIMATED_GENERATION_COST_CENTS);
            if let Some(meta) = cached.metadata.as_mut() {
                meta.from_fallback = Some(true);
                meta.fallback_source = Some("l1_cache".to_string());
                meta.duration_ms = Some(start.elapsed().as_millis() as u64);
            }
            return Ok(Some(cached));
        }

        if !high_relevance.is_empty() {
            Counters::inc(&self.counters.fallbacks_excerpts);
            info!(
                user_id,
                kind = ActivityKind::FallbackExcerpts.as_str(),
                status = ActivityStatus::Warning.as_str(),
                "fallback: excerpts"
            );
            let bullets: Vec<String> = high_relevance
                .iter()
                .take(3)
                .map(|rc| {
                    let excerpt: String = rc.chunk.text.chars().take(200).collect();
                    format!("- {excerpt}")
                })
                .collect();
            let answer = format!(
                "The AI assistant is temporarily unavailable. Here are relevant excerpts from your notes:\n\n{}",
                bullets.join("\n")
            );
            return Ok(Some(QueryResponse {
                answer,
                sources: Vec::new(),
                metadata: Some(QueryResponseMetadata {
                    query_tokens: Some(query_tokens),
                    query_truncated: Some(query_truncated),
                    context_tokens: Some(build.context_tokens),
                    context_truncated: Some(build.context_truncated),
                    chunks_retrieved: Some(chunks_retrieved),
                    from_fallback: Some(true),
                    fallback_source: Some("excerpts".to_string()),
                    duration_ms: Some(start.elapsed().as_millis() as u64),
                    ..Default::default()
                }),
            }));
        }

        warn!(
            user_id,
            kind = ActivityKind::ServiceUnavailable.as_str(),
            status = ActivityStatus::Error.as_str(),
            "no fallback available"
        );
        let circuit_status = serde_json::to_value(self.breaker.status()).ok();
        Err(ApiError::ServiceUnavailable(
            "the assistant is temporarily unavailable, please try again shortly".to_string(),
            circuit_status,
        ))
    }
}

