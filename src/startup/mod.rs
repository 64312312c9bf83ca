//! Connectivity check run once before the service starts serving.

use crate::config::StartupConfig;
use crate::infrastructure::resilience::ExponentialBackoff;
use crate::metrics::PoolMetrics;
use crate::pool::{Backend, Pool, PoolError};

/// How the startup check ended when it did not abort.
#[derive(Debug)]
pub enum StartupOutcome {
    /// A connection was acquired and returned
    Connected { attempts: u32 },
    /// Every attempt failed; the service runs and acquisitions retry on demand
    Degraded { attempts: u32, error: PoolError },
}

impl StartupOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, StartupOutcome::Connected { .. })
    }
}

/// Acquire one connection and give it back, retrying with backoff.
///
/// # Errors
/// When the database rejects the configuration, or when `config.fail_fast`
/// is set and the database stays unreachable.
pub async fn check_connectivity<B: Backend>(
    pool: &Pool<B>,
    config: &StartupConfig,
) -> Result<StartupOutcome, PoolError> {
    let mut backoff = ExponentialBackoff::with_config(config.backoff.clone());
    let mut attempts = 0;

    loop {
        attempts += 1;

        let error = match pool.acquire().await {
            Ok(mut conn) => {
                pool.release(&mut conn)?;
                PoolMetrics::record_startup_attempt("ok");
                tracing::info!(attempts, "Connected to the database");
                return Ok(StartupOutcome::Connected { attempts });
            }
            Err(e) => e,
        };
        PoolMetrics::record_startup_attempt("failed");

        if attempts > config.retries || !error.is_retryable() {
            tracing::error!(attempts, error = %error, "Error connecting to the database");
            if config.fail_fast || error.is_rejection() {
                return Err(error);
            }
            tracing::warn!("Continuing without a verified database connection");
            return Ok(StartupOutcome::Degraded { attempts, error });
        }

        let delay = backoff.next_delay();
        tracing::warn!(
            attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Database not reachable yet"
        );
        tokio::time::sleep(delay).await;
    }
}
