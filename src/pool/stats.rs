//! Pool statistics snapshot

use serde::Serialize;

/// Point-in-time view of the pool, taken under the pool lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub in_use: usize,
    pub waiters: usize,
    /// Connect attempts in flight (they hold capacity)
    pub connecting: usize,
    pub max_connections: usize,
    pub closed: bool,
    /// Successful acquisitions since construction
    pub acquired: u64,
    /// Connections opened since construction
    pub created: u64,
    /// Connections closed because they were broken, stale or expired
    pub discarded: u64,
    /// Acquisitions that gave up at their deadline
    pub timed_out: u64,
    pub connect_failures: u64,
}

impl PoolStats {
    /// Connections counted against `max_connections`.
    pub fn total(&self) -> usize {
        self.idle + self.in_use + self.connecting
    }

    /// Fraction of capacity currently checked out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            0.0
        } else {
            self.in_use as f64 / self.max_connections as f64
        }
    }
}
