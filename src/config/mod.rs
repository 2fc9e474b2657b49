//! Configuration layer. One `Settings` struct assembled from a base TOML
//! file plus environment overrides, following the `Config::builder()`
//! pattern (`config` + `dotenvy`), generalized here to the assistant's env
//! var table.

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub assistant: AssistantConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

/// Core assistant tunables — directly named after the `ASSISTANT_*` env
/// vars in the interface contract.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AssistantConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_context_tokens: usize,
    pub max_output_tokens: usize,
    pub user_query_tokens: usize,
    pub top_k: usize,
    pub relevance_threshold: f32,
    pub max_sources: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub redis_url: String,
    pub query_ttl_seconds: u64,
    pub embedding_ttl_seconds: u64,
    pub context_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub fail_threshold: u32,
    pub timeout_open_seconds: u64,
    pub reset_window_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LimitsConfig {
    pub embedding_concurrency: usize,
    pub vector_search_concurrency: usize,
    pub llm_generate_concurrency: usize,
    pub acquire_timeout_ms: u64,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "postgres://localhost/sermon_rag")?
            .set_default("database.pool_max_size", 10)?
            .set_default("database.pool_timeout_seconds", 5)?
            .set_default("embedding.model", "sentence-transformers/all-MiniLM-L6-v2")?
            .set_default("embedding.dimension", 384)?
            .set_default("llm.model", "meta-llama/Llama-3.2-3B-Instruct")?
            .set_default("llm.timeout_seconds", 60)?
            .set_default("assistant.chunk_size", 384)?
            .set_default("assistant.chunk_overlap", 64)?
            .set_default("assistant.max_context_tokens", 1200)?
            .set_default("assistant.max_output_tokens", 400)?
            .set_default("assistant.user_query_tokens", 150)?
            .set_default("assistant.top_k", 10)?
            .set_default("assistant.relevance_threshold", 0.6)?
            .set_default("assistant.max_sources", 5)?
            .set_default("cache.enabled", true)?
            .set_default("cache.redis_url", "redis://127.0.0.1:6379")?
            .set_default("cache.query_ttl_seconds", 86_400)?
            .set_default("cache.embedding_ttl_seconds", 604_800)?
            .set_default("cache.context_ttl_seconds", 3_600)?
            .set_default("circuit_breaker.enabled", true)?
            .set_default("circuit_breaker.fail_threshold", 5)?
            .set_default("circuit_breaker.timeout_open_seconds", 30)?
            .set_default("circuit_breaker.reset_window_seconds", 60)?
            .set_default("limits.embedding_concurrency", 16)?
            .set_default("limits.vector_search_concurrency", 16)?
            .set_default("limits.llm_generate_concurrency", 8)?
            .set_default("limits.acquire_timeout_ms", 5_000)?
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;

        // Flat env-var names per the interface contract take precedence over
        // both the TOML file and the APP__ prefixed form, matching how
        // deployment scripts set these directly.
        macro_rules! flat_override {
            ($env:literal, $field:expr, $parse:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Some(parsed) = $parse(val) {
                        $field = parsed;
                    }
                }
            };
        }

        flat_override!("EMBEDDING_MODEL", settings.embedding.model, |v: String| Some(v));
        flat_override!("LLM_MODEL", settings.llm.model, |v: String| Some(v));
        if let Ok(val) = std::env::var("LLM_API_KEY") {
            settings.llm.api_key = Some(val);
        }
        flat_override!("LLM_TIMEOUT_S", settings.llm.timeout_seconds, |v: String| v.parse().ok());
        flat_override!("ASSISTANT_CHUNK_SIZE", settings.assistant.chunk_size, |v: String| v.parse().ok());
        flat_override!("ASSISTANT_CHUNK_OVERLAP", settings.assistant.chunk_overlap, |v: String| v.parse().ok());
        flat_override!("ASSISTANT_MAX_CONTEXT_TOKENS", settings.assistant.max_context_tokens, |v: String| v.parse().ok());
        flat_override!("ASSISTANT_MAX_OUTPUT_TOKENS", settings.assistant.max_output_tokens, |v: String| v.parse().ok());
        flat_override!("ASSISTANT_USER_QUERY_TOKENS", settings.assistant.user_query_tokens, |v: String| v.parse().ok());
        flat_override!("ASSISTANT_TOP_K", settings.assistant.top_k, |v: String| v.parse().ok());
        flat_override!("ASSISTANT_RELEVANCE_THRESHOLD", settings.assistant.relevance_threshold, |v: String| v.parse().ok());
        flat_override!("CACHE_ENABLED", settings.cache.enabled, |v: String| v.parse().ok());
        flat_override!("CACHE_QUERY_TTL_S", settings.cache.query_ttl_seconds, |v: String| v.parse().ok());
        flat_override!("CACHE_EMBEDDING_TTL_S", settings.cache.embedding_ttl_seconds, |v: String| v.parse().ok());
        flat_override!("CACHE_CONTEXT_TTL_S", settings.cache.context_ttl_seconds, |v: String| v.parse().ok());
        flat_override!("CIRCUIT_BREAKER_ENABLED", settings.circuit_breaker.enabled, |v: String| v.parse().ok());
        flat_override!("CIRCUIT_BREAKER_FAIL_THRESHOLD", settings.circuit_breaker.fail_threshold, |v: String| v.parse().ok());
        flat_override!("CIRCUIT_BREAKER_TIMEOUT_S", settings.circuit_breaker.timeout_open_seconds, |v: String| v.parse().ok());
        flat_override!("CIRCUIT_BREAKER_RESET_WINDOW_S", settings.circuit_breaker.reset_window_seconds, |v: String| v.parse().ok());
        flat_override!("DATABASE_URL", settings.database.url, |v: String| Some(v));
        flat_override!("REDIS_URL", settings.cache.redis_url, |v: String| Some(v));

        Ok(settings)
    }
}
