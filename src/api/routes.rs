use axum::{routing::get, Router};

use crate::pool::Backend;
use crate::server::AppState;

use super::health::{health, ready, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes<B: Backend>() -> Router<AppState<B>> {
    Router::new()
        // Health & Stats
        .route("/health", get(health::<B>))
        .route("/health/ready", get(ready::<B>))
        .route("/stats", get(stats::<B>))
        // Prometheus
        .route("/metrics", get(prometheus_metrics::<B>))
}
