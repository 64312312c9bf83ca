//! Admin endpoint tests
//!
//! Requests go straight into the router with `tower::ServiceExt::oneshot`,
//! backed by the scripted in-memory pool backend.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use academia_pool::config::Settings;
use academia_pool::pool::testing::ScriptedBackend;
use academia_pool::resilience::{CircuitBreaker, CircuitBreakerConfig};
use academia_pool::server::{create_app, AppState};
use academia_pool::{Pool, PoolConfig};

fn test_pool(backend: &ScriptedBackend) -> Pool<ScriptedBackend> {
    let config = PoolConfig {
        max_connections: 2,
        acquire_timeout_ms: 200,
        ..Default::default()
    };
    Pool::new(config, backend.clone()).unwrap()
}

fn test_app(pool: Pool<ScriptedBackend>) -> Router {
    let settings = Settings::from_vars(&HashMap::new()).unwrap();
    create_app(AppState::new(settings, pool))
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn test_health_reports_pool_state() {
    let backend = ScriptedBackend::new();
    let pool = test_pool(&backend);
    let _conn = pool.acquire().await.unwrap();

    let (status, body) = get_json(test_app(pool.clone()), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["in_use"], 1);
    assert_eq!(body["database"]["max_connections"], 2);
    assert_eq!(body["database"]["pool_id"], pool.id().to_string());
    assert_eq!(
        body["database"]["url"],
        "mysql://root@localhost:3306/academia_final"
    );
    assert!(body.get("circuit_breaker").is_none());
}

#[tokio::test]
async fn test_health_shows_open_breaker_as_degraded() {
    let pool = test_pool(&ScriptedBackend::new());
    let breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig {
        failure_threshold: 1,
        reset_timeout_ms: 60_000,
        ..Default::default()
    }));
    breaker.record_failure();

    let settings = Settings::from_vars(&HashMap::new()).unwrap();
    let app = create_app(AppState::new(settings, pool).with_circuit_breaker(breaker));
    let (_, body) = get_json(app, "/health").await;

    assert_eq!(body["status"], "degraded");
    assert_eq!(body["circuit_breaker"]["state"], "open");
}

#[tokio::test]
async fn test_stats_returns_snapshot() {
    let pool = test_pool(&ScriptedBackend::new());
    drop(pool.acquire().await.unwrap());

    let (status, body) = get_json(test_app(pool), "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["idle"], 1);
    assert_eq!(body["in_use"], 0);
    assert_eq!(body["created"], 1);
    assert_eq!(body["closed"], false);
}

#[tokio::test]
async fn test_ready_round_trips_a_connection() {
    let backend = ScriptedBackend::new();
    let pool = test_pool(&backend);

    let (status, body) = get_json(test_app(pool.clone()), "/health/ready").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(backend.connects(), 1);
    assert_eq!(pool.stats().idle, 1);
}

#[tokio::test]
async fn test_ready_when_database_down() {
    let backend = ScriptedBackend::new();
    backend.fail_connects(true);

    let (status, body) = get_json(test_app(test_pool(&backend)), "/health/ready").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "DATABASE_UNAVAILABLE");
}

#[tokio::test]
async fn test_ready_after_shutdown() {
    let pool = test_pool(&ScriptedBackend::new());
    pool.shutdown().await;

    let (status, body) = get_json(test_app(pool), "/health/ready").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "POOL_CLOSED");
}

#[tokio::test]
async fn test_metrics_exposes_pool_gauges() {
    let pool = test_pool(&ScriptedBackend::new());
    let _conn = pool.acquire().await.unwrap();

    let (status, body) = get(test_app(pool), "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("dbpool_connections_in_use"));
    assert!(body.contains("dbpool_acquire_total"));
}
