//! Structured, per-step observability for the orchestrator pipeline.
//! Activity taxonomy carried over from `logging/types.rs`, but without its
//! Postgres-backed persistence — emission is pure `tracing` plus a small
//! set of process-wide counters, since no activity-log table is part of
//! this core's persisted state.

pub mod types;

pub use types::{ActivityKind, ActivityStatus};

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters backing the cache-stats and health endpoints.
#[derive(Default)]
pub struct Counters {
    pub l1_hits: AtomicU64,
    pub l1_misses: AtomicU64,
    pub l2_hits: AtomicU64,
    pub l2_misses: AtomicU64,
    pub l3_hits: AtomicU64,
    pub l3_misses: AtomicU64,
    pub generations: AtomicU64,
    pub generation_failures: AtomicU64,
    pub fallbacks_excerpts: AtomicU64,
    pub fallbacks_l1: AtomicU64,
    pub circuit_rejections: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l1_misses: self.l1_misses.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            l2_misses: self.l2_misses.load(Ordering::Relaxed),
            l3_hits: self.l3_hits.load(Ordering::Relaxed),
            l3_misses: self.l3_misses.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            fallbacks_excerpts: self.fallbacks_excerpts.load(Ordering::Relaxed),
            fallbacks_l1: self.fallbacks_l1.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CountersSnapshot {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l3_hits: u64,
    pub l3_misses: u64,
    pub generations: u64,
    pub generation_failures: u64,
    pub fallbacks_excerpts: u64,
    pub fallbacks_l1: u64,
    pub circuit_rejections: u64,
}
