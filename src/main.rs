//! Process bootstrap: load settings, wire the seven-step pipeline's
//! collaborators, build the axum router, serve. Bootstrap shape (tracing
//! init, settings load, pool construction, router assembly, `axum::serve`)
//! carried over from `main.rs`'s original bootstrap — security middleware
//! (IP whitelist, header validator, document auth) dropped per DESIGN.md,
//! since request authentication here is an external collaborator.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sermon_rag_core::cache::CacheLayer;
use sermon_rag_core::config::Settings;
use sermon_rag_core::database::{DbPool, Repository};
use sermon_rag_core::handlers;
use sermon_rag_core::logging::Counters;
use sermon_rag_core::services::{
    ChunkerService, CircuitBreaker, Embedder, LlmClient, NoteMetaProvider, NoteMetaStore,
    Orchestrator, PgVectorStore, RetrievalService, VectorStore,
};
use sermon_rag_core::state::AppState;
use sermon_rag_core::utils::limiters::Limiters;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sermon_rag_core=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("starting sermon-rag-core");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    info!("database connection established");

    let repo = Repository::new(db_pool.clone());
    let note_meta_repo = Repository::new(db_pool.clone());

    let limiters = Arc::new(Limiters::new(
        settings.limits.embedding_concurrency,
        settings.limits.vector_search_concurrency,
        settings.limits.llm_generate_concurrency,
        settings.limits.acquire_timeout_ms,
    ));

    let counters = Arc::new(Counters::default());
    let cache = Arc::new(CacheLayer::new(&settings.cache, counters.clone()));

    let embedder = Arc::new(Embedder::new(settings.embedding.clone(), limiters.clone()));
    let vector_store: Arc<dyn VectorStore> = Arc::new(PgVectorStore::new(repo, limiters.clone()));
    let note_meta: Arc<dyn NoteMetaProvider> = Arc::new(NoteMetaStore::new(note_meta_repo));

    let chunker = Arc::new(ChunkerService::new(
        embedder.clone(),
        vector_store.clone(),
        note_meta.clone(),
        cache.clone(),
        settings.assistant.clone(),
    ));

    let retrieval = Arc::new(RetrievalService::new(
        embedder.clone(),
        vector_store.clone(),
        cache.clone(),
        settings.assistant.top_k.min(20),
        settings.assistant.relevance_threshold,
    ));

    let breaker = Arc::new(CircuitBreaker::new(
        settings.circuit_breaker.enabled,
        settings.circuit_breaker.fail_threshold,
        settings.circuit_breaker.timeout_open_seconds,
        settings.circuit_breaker.reset_window_seconds,
    ));

    let llm = Arc::new(LlmClient::new(
        settings.llm.base_url.clone(),
        settings.llm.api_key.clone(),
        settings.llm.model.clone(),
        settings.llm.timeout_seconds,
        settings.assistant.max_output_tokens,
        limiters.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        retrieval,
        note_meta,
        cache.clone(),
        breaker.clone(),
        llm,
        counters.clone(),
        settings.assistant.max_context_tokens,
        settings.assistant.user_query_tokens,
        settings.assistant.max_sources,
    ));

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState {
        settings,
        db_pool,
        cache,
        breaker,
        orchestrator,
        chunker,
        counters,
    };

    let app = build_router(state);

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/assistant/query", post(handlers::query::query_handler))
        .route("/assistant/health/circuit-breaker", get(handlers::health::circuit_breaker_health))
        .route("/assistant/cache-stats", get(handlers::cache_stats::cache_stats_handler))
        .route("/internal/notes/written", post(handlers::ingestion::on_note_written))
        .route("/health", get(handlers::health::health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
