//! Health check and statistics endpoints.

use std::time::{Duration, Instant};

use axum::{extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::infrastructure::resilience::{CircuitBreakerStats, CircuitState};
use crate::pool::{Backend, PoolStats};
use crate::server::AppState;

/// Upper bound on the readiness probe's acquire
const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: DatabaseHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerStats>,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealthResponse {
    pub pool_id: Uuid,
    pub url: String,
    pub utilization: f64,
    #[serde(flatten)]
    pub pool: PoolStats,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub latency_ms: u64,
}

fn overall_status(stats: &PoolStats, breaker: Option<&CircuitBreakerStats>) -> &'static str {
    if stats.closed {
        "closed"
    } else if breaker.is_some_and(|b| b.state == CircuitState::Open) {
        "degraded"
    } else if stats.waiters > 0 {
        "saturated"
    } else {
        "healthy"
    }
}

/// GET /health - pool status without touching the database
pub async fn health<B: Backend>(State(state): State<AppState<B>>) -> Json<HealthResponse> {
    let stats = state.pool.stats();
    let breaker = state.circuit_breaker.as_ref().map(|cb| cb.stats());

    Json(HealthResponse {
        status: overall_status(&stats, breaker.as_ref()).to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database: DatabaseHealthResponse {
            pool_id: state.pool.id(),
            url: state.pool.config().masked_url(),
            utilization: stats.utilization(),
            pool: stats,
        },
        circuit_breaker: breaker,
    })
}

/// GET /health/ready - acquire and return one connection
pub async fn ready<B: Backend>(
    State(state): State<AppState<B>>,
) -> Result<Json<ReadyResponse>, AppError> {
    let started = Instant::now();
    let timeout = READY_TIMEOUT.min(state.pool.config().acquire_timeout());

    let mut conn = state.pool.acquire_timeout(timeout).await?;
    state.pool.release(&mut conn)?;

    Ok(Json(ReadyResponse {
        status: "ready".to_string(),
        latency_ms: started.elapsed().as_millis() as u64,
    }))
}

/// GET /stats - raw pool snapshot
pub async fn stats<B: Backend>(State(state): State<AppState<B>>) -> Json<PoolStats> {
    Json(state.pool.stats())
}
