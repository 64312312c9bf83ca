//! Graceful shutdown handling.
//!
//! 1. Close the pool: queued acquisitions fail, idle connections close
//! 2. Wait a bounded time for checked-out connections to come back

use std::time::Duration;

use tokio::signal;
use tokio::time::timeout;

use crate::pool::{Backend, Pool};

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for checked-out connections (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Poll interval while draining
    pub poll_interval: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Drives pool shutdown
pub struct GracefulShutdown<B: Backend> {
    pool: Pool<B>,
    config: ShutdownConfig,
}

impl<B: Backend> GracefulShutdown<B> {
    pub fn new(pool: Pool<B>) -> Self {
        Self::with_config(pool, ShutdownConfig::default())
    }

    pub fn with_config(pool: Pool<B>, config: ShutdownConfig) -> Self {
        Self { pool, config }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(pool_id = %self.pool.id())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let before = self.pool.stats();

        tracing::info!(reason = %reason, in_use = before.in_use, "Closing connection pool");
        self.pool.shutdown().await;

        let remaining = self.drain().await;

        let result = ShutdownResult {
            success: remaining == 0,
            connections_drained: before.in_use.saturating_sub(remaining),
            remaining,
            duration: start.elapsed(),
        };

        tracing::info!(
            connections_drained = result.connections_drained,
            remaining = result.remaining,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    /// Wait for checked-out connections; returns how many are still out.
    async fn drain(&self) -> usize {
        let outstanding = || {
            let stats = self.pool.stats();
            stats.in_use + stats.connecting
        };

        if outstanding() == 0 {
            return 0;
        }

        let wait = async {
            while outstanding() > 0 {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        if timeout(self.config.drain_timeout, wait).await.is_err() {
            tracing::warn!(
                remaining_connections = outstanding(),
                "Some connections were not returned before the drain timeout"
            );
        }
        outstanding()
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Every checked-out connection came back in time
    pub success: bool,
    pub connections_drained: usize,
    pub remaining: usize,
    pub duration: Duration,
}

/// Resolve on Ctrl+C or SIGTERM and return which one arrived.
pub async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "ctrl_c"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "sigterm"
        }
    }
}
