//! Activity taxonomy for the orchestrator's per-step structured logs.
//! Shape carried over from an `ActivityType`/`ActivityStatus` enum pair;
//! trimmed to the events this stateless pipeline actually emits.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    QueryReceived,
    L1CacheHit,
    Retrieved,
    ContextAssembled,
    NoContext,
    Generated,
    GenerationFailed,
    CircuitOpen,
    FallbackExcerpts,
    FallbackL1,
    ServiceUnavailable,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::QueryReceived => "query_received",
            ActivityKind::L1CacheHit => "l1_cache_hit",
            ActivityKind::Retrieved => "retrieved",
            ActivityKind::ContextAssembled => "context_assembled",
            ActivityKind::NoContext => "no_context",
            ActivityKind::Generated => "generated",
            ActivityKind::GenerationFailed => "generation_failed",
            ActivityKind::CircuitOpen => "circuit_open",
            ActivityKind::FallbackExcerpts => "fallback_excerpts",
            ActivityKind::FallbackL1 => "fallback_l1",
            ActivityKind::ServiceUnavailable => "service_unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Warning,
    Error,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Warning => "warning",
            ActivityStatus::Error => "error",
        }
    }
}
