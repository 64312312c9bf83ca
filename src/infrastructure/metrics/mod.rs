//! Prometheus metrics for the connection pool.
//!
//! - Pool occupancy gauges (idle, in use, waiters, connecting)
//! - Acquisition outcomes and latency
//! - Connection churn (created, discarded, connect failures)
//! - Connect circuit breaker state

mod helpers;

pub use helpers::{encode_metrics, BreakerMetrics, PoolMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "dbpool";

lazy_static! {
    // ============================================================================
    // Occupancy
    // ============================================================================

    /// Idle connections ready for checkout
    pub static ref POOL_IDLE: IntGauge = register_int_gauge!(
        format!("{}_connections_idle", METRIC_PREFIX),
        "Idle connections held by the pool"
    ).unwrap();

    /// Connections currently lent to callers
    pub static ref POOL_IN_USE: IntGauge = register_int_gauge!(
        format!("{}_connections_in_use", METRIC_PREFIX),
        "Connections currently checked out"
    ).unwrap();

    /// Connect attempts holding capacity
    pub static ref POOL_CONNECTING: IntGauge = register_int_gauge!(
        format!("{}_connections_connecting", METRIC_PREFIX),
        "Connect attempts in flight"
    ).unwrap();

    /// Configured upper bound
    pub static ref POOL_MAX: IntGauge = register_int_gauge!(
        format!("{}_connections_max", METRIC_PREFIX),
        "Configured maximum number of connections"
    ).unwrap();

    /// Queued acquisitions
    pub static ref POOL_WAITERS: IntGauge = register_int_gauge!(
        format!("{}_waiters", METRIC_PREFIX),
        "Acquisitions waiting for a connection"
    ).unwrap();

    // ============================================================================
    // Acquisition
    // ============================================================================

    /// Acquisitions by result (ok, exhausted, connect_failed, closed, ...)
    pub static ref ACQUIRE_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_acquire_total", METRIC_PREFIX),
        "Total acquisitions by result",
        &["result"]
    ).unwrap();

    /// Time spent in acquire, including waiting, connect and probe
    pub static ref ACQUIRE_DURATION: HistogramVec = register_histogram_vec!(
        format!("{}_acquire_duration_seconds", METRIC_PREFIX),
        "Acquire latency in seconds",
        &["result"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Churn
    // ============================================================================

    pub static ref CONNECTIONS_CREATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_created_total", METRIC_PREFIX),
        "Total connections opened"
    ).unwrap();

    /// Broken, stale or expired connections closed by the pool
    pub static ref CONNECTIONS_DISCARDED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_discarded_total", METRIC_PREFIX),
        "Total connections discarded"
    ).unwrap();

    pub static ref CONNECT_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connect_failures_total", METRIC_PREFIX),
        "Total failed connect attempts"
    ).unwrap();

    // ============================================================================
    // Resilience
    // ============================================================================

    /// Connect circuit breaker state (0=closed, 1=open, 2=half-open)
    pub static ref CIRCUIT_BREAKER_STATE: IntGauge = register_int_gauge!(
        format!("{}_circuit_breaker_state", METRIC_PREFIX),
        "Connect circuit breaker state (0=closed, 1=open, 2=half-open)"
    ).unwrap();

    /// Startup connectivity check attempts
    pub static ref STARTUP_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_startup_attempts_total", METRIC_PREFIX),
        "Startup connectivity check attempts by result",
        &["result"]
    ).unwrap();
}
