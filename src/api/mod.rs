//! API layer - read-only admin endpoints.

mod health;
mod metrics;
mod routes;

pub use health::{health, ready, stats, DatabaseHealthResponse, HealthResponse, ReadyResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
