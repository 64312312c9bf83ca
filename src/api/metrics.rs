//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::metrics::{self, BreakerMetrics, PoolMetrics};
use crate::pool::Backend;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics<B: Backend>(
    State(state): State<AppState<B>>,
) -> impl IntoResponse {
    update_metrics_from_state(&state);

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Gauges are refreshed at scrape time; counters are recorded by the pool.
fn update_metrics_from_state<B: Backend>(state: &AppState<B>) {
    PoolMetrics::set_from_stats(&state.pool.stats());

    if let Some(ref breaker) = state.circuit_breaker {
        BreakerMetrics::set_state(breaker.state());
    }
}
