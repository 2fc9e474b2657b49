//! `GET /assistant/cache-stats` (auth-guarded externally, per the interface
//! contract — no auth check happens in this handler itself).

use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Serialize)]
pub struct CombinedStats {
    pub cost_saved_usd: f64,
}

#[derive(Serialize)]
pub struct CacheStatsResponse {
    pub l1: TierStats,
    pub l2: TierStats,
    pub l3: TierStats,
    pub combined: CombinedStats,
}

pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let snapshot = state.counters.snapshot();
    Json(CacheStatsResponse {
        l1: TierStats {
            hits: snapshot.l1_hits,
            misses: snapshot.l1_misses,
        },
        l2: TierStats {
            hits: snapshot.l2_hits,
            misses: snapshot.l2_misses,
        },
        l3: TierStats {
            hits: snapshot.l3_hits,
            misses: snapshot.l3_misses,
        },
        combined: CombinedStats {
            cost_saved_usd: state.cache.cost_saved_usd(),
        },
    })
}
