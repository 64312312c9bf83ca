//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    ACQUIRE_DURATION, ACQUIRE_TOTAL, CIRCUIT_BREAKER_STATE, CONNECTIONS_CREATED_TOTAL,
    CONNECTIONS_DISCARDED_TOTAL, CONNECT_FAILURES_TOTAL, POOL_CONNECTING, POOL_IDLE, POOL_IN_USE,
    POOL_MAX, POOL_WAITERS, STARTUP_ATTEMPTS_TOTAL,
};
use crate::infrastructure::resilience::CircuitState;
use crate::pool::PoolStats;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording pool metrics
pub struct PoolMetrics;

impl PoolMetrics {
    /// Record an acquisition outcome and how long it took
    pub fn record_acquire(result: &str, elapsed: Duration) {
        ACQUIRE_TOTAL.with_label_values(&[result]).inc();
        ACQUIRE_DURATION
            .with_label_values(&[result])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_created() {
        CONNECTIONS_CREATED_TOTAL.inc();
    }

    pub fn record_discarded() {
        CONNECTIONS_DISCARDED_TOTAL.inc();
    }

    pub fn record_connect_failure() {
        CONNECT_FAILURES_TOTAL.inc();
    }

    /// Record a startup connectivity attempt ("ok" or "failed")
    pub fn record_startup_attempt(result: &str) {
        STARTUP_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
    }

    /// Refresh occupancy gauges from a snapshot
    pub fn set_from_stats(stats: &PoolStats) {
        POOL_IDLE.set(stats.idle as i64);
        POOL_IN_USE.set(stats.in_use as i64);
        POOL_CONNECTING.set(stats.connecting as i64);
        POOL_WAITERS.set(stats.waiters as i64);
        POOL_MAX.set(stats.max_connections as i64);
    }
}

/// Helper struct for circuit breaker metrics
pub struct BreakerMetrics;

impl BreakerMetrics {
    pub fn set_state(state: CircuitState) {
        CIRCUIT_BREAKER_STATE.set(state as i64);
    }
}
