//! Application state composition root: `AppState` as a `Clone` bag of
//! `Arc`-wrapped collaborators, trimmed of the auth/security/conversation
//! fields this core has no counterpart for.

use crate::cache::CacheLayer;
use crate::config::Settings;
use crate::database::DbPool;
use crate::logging::Counters;
use crate::services::{ChunkerService, CircuitBreaker, Orchestrator};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub db_pool: DbPool,
    pub cache: Arc<CacheLayer>,
    pub breaker: Arc<CircuitBreaker>,
    pub orchestrator: Arc<Orchestrator>,
    pub chunker: Arc<ChunkerService>,
    pub counters: Arc<Counters>,
}
