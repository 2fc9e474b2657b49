//! Three independent TTL caches (L1 query, L2 embedding, L3 context) over a
//! shared Redis connection. TTL-checked lazy-deletion shape carried over in
//! idiom from `services/conversation/cache.rs`, and the cache-then-call
//! pattern from `services/embedding_service.rs`; backed here by `redis` +
//! `deadpool-redis` rather than an in-process `DashMap`, since the contract
//! requires a shared network key-value store (see DESIGN.md Open Question 3
//! for why `redis` specifically).
//!
//! Every cache error is caught inside this module and turned into a miss —
//! callers never see `CacheError`; it exists only for this module's own
//! logging.

pub mod keys;

use crate::config::CacheConfig;
use crate::logging::Counters;
use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub enum CacheTier {
    L1Query,
    L2Embedding,
    L3Context,
}

pub struct CacheLayer {
    pool: Option<Pool>,
    enabled: bool,
    query_ttl: Duration,
    embedding_ttl: Duration,
    context_ttl: Duration,
    op_timeout: Duration,
    counters: Arc<Counters>,
    cost_saved_cents: AtomicU64,
}

impl CacheLayer {
    pub fn new(config: &CacheConfig, counters: Arc<Counters>) -> Self {
        let pool = if config.enabled {
            RedisPoolConfig::from_url(&config.redis_url)
                .create_pool(Some(Runtime::Tokio1))
                .map_err(|e| warn!(error = %e, "failed to build redis pool, cache disabled"))
                .ok()
        } else {
            None
        };

        Self {
            pool,
            enabled: config.enabled,
            query_ttl: Duration::from_secs(config.query_ttl_seconds),
            embedding_ttl: Duration::from_secs(config.embedding_ttl_seconds),
            context_ttl: Duration::from_secs(config.context_ttl_seconds),
            op_timeout: Duration::from_secs(2),
            counters,
            cost_saved_cents: AtomicU64::new(0),
        }
    }

    fn ttl_for(&self, tier: CacheTier) -> Duration {
        match tier {
            CacheTier::L1Query => self.query_ttl,
            CacheTier::L2Embedding => self.embedding_ttl,
            CacheTier::L3Context => self.context_ttl,
        }
    }

    /// Every cache error is caught and logged as a warning; the caller sees
    /// a plain miss and falls through to the primary path. This is the only
    /// place a Redis error is ever observed.
    pub async fn get<T: DeserializeOwned>(&self, tier: CacheTier, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let pool = self.pool.as_ref()?;

        let fut = async {
            let mut conn = pool.get().await.ok()?;
            let raw: Option<Vec<u8>> = conn.get(key).await.ok()?;
            raw
        };

        let raw = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.record_miss(tier);
                return None;
            }
            Err(_) => {
                warn!(key, "cache get timed out, treating as miss");
                self.record_miss(tier);
                return None;
            }
        };

        match serde_json::from_slice::<T>(&raw) {
            Ok(value) => {
                self.record_hit(tier);
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "cache deserialize failed, treating as miss");
                self.record_miss(tier);
                None
            }
        }
    }

    pub async fn set<T: Serialize + Sync>(&self, tier: CacheTier, key: &str, value: &T) {
        if !self.enabled {
            return;
        }
        let Some(pool) = self.pool.as_ref() else { return };

        let Ok(bytes) = serde_json::to_vec(value) else {
            warn!(key, "cache serialize failed");
            return;
        };

        let ttl = self.ttl_for(tier);
        let fut = async {
            let mut conn = pool.get().await.map_err(|e| e.to_string())?;
            conn.set_ex::<_, _, ()>(key, bytes, ttl.as_secs())
                .await
                .map_err(|e| e.to_string())
        };

        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(key, error = %e, "cache set failed"),
            Err(_) => warn!(key, "cache set timed out"),
        }
    }

    /// Invalidates every L3 entry for a user. L3 is the only cache the
    /// ingestion contract invalidates; L1/L2 are unaffected by note
    /// mutations by definition of their key semantics.
    pub async fn invalidate_user_context(&self, user_id: &str) {
        if !self.enabled {
            return;
        }
        let Some(pool) = self.pool.as_ref() else { return };

        let pattern = format!("context:v1:{}:*", user_id);
        let fut = async {
            let mut conn = pool.get().await.map_err(|e| e.to_string())?;
            let keys: Vec<String> = conn.keys(&pattern).await.map_err(|e| e.to_string())?;
            if !keys.is_empty() {
                conn.del::<_, ()>(&keys).await.map_err(|e| e.to_string())?;
            }
            Ok::<_, String>(())
        };

        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(user_id, error = %e, "L3 invalidation failed"),
            Err(_) => warn!(user_id, "L3 invalidation timed out"),
        }
    }

    pub fn record_generation_cost_saved(&self, cents: u64) {
        self.cost_saved_cents.fetch_add(cents, Ordering::Relaxed);
    }

    pub fn cost_saved_usd(&self) -> f64 {
        self.cost_saved_cents.load(Ordering::Relaxed) as f64 / 100.0
    }

    fn record_hit(&self, tier: CacheTier) {
        match tier {
            CacheTier::L1Query => Counters::inc(&self.counters.l1_hits),
            CacheTier::L2Embedding => Counters::inc(&self.counters.l2_hits),
            CacheTier::L3Context => Counters::inc(&self.counters.l3_hits),
        }
    }

    fn record_miss(&self, tier: CacheTier) {
        match tier {
            CacheTier::L1Query => Counters::inc(&self.counters.l1_misses),
            CacheTier::L2Embedding => Counters::inc(&self.counters.l2_misses),
            CacheTier::L3Context => Counters::inc(&self.counters.l3_misses),
        }
    }
}
