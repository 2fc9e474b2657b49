//! `GET /assistant/health/circuit-breaker`. Shape carried over from an
//! existing `handlers/health.rs`.

use crate::services::circuit_breaker::BreakerState;
use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct CircuitBreakerHealth {
    pub state: BreakerState,
    pub fail_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub healthy: bool,
    pub enabled: bool,
}

pub async fn circuit_breaker_health(State(state): State<AppState>) -> Json<CircuitBreakerHealth> {
    let status = state.breaker.status();
    Json(CircuitBreakerHealth {
        state: status.state,
        fail_count: status.consecutive_failures,
        last_failure_time: status.last_failure_time,
        healthy: status.state == BreakerState::Closed,
        enabled: state.settings.circuit_breaker.enabled,
    })
}

pub async fn health_check() -> &'static str {
    "ok"
}
