//! MySQL backend built on sqlx connections.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError};
use sqlx::{ConnectOptions, Connection};

use crate::infrastructure::resilience::CircuitBreaker;
use crate::pool::{Backend, BackendError, PoolConfig};

/// Access denied to database
const ER_DBACCESS_DENIED: u16 = 1044;
/// Access denied for user
const ER_ACCESS_DENIED: u16 = 1045;
/// Unknown database
const ER_BAD_DB: u16 = 1049;

/// Opens single MySQL sessions for the pool.
pub struct MySqlBackend {
    options: MySqlConnectOptions,
    connect_timeout: Duration,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    url: String,
}

impl MySqlBackend {
    pub fn new(config: &PoolConfig) -> Self {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database);
        if let Some(ref password) = config.password {
            options = options.password(password);
        }

        Self {
            options,
            connect_timeout: config.connect_timeout(),
            circuit_breaker: None,
            url: config.masked_url(),
        }
    }

    /// Fail connects fast while the breaker is open.
    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// Connection URL with the password masked.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> Result<MySqlConnection, BackendError> {
        match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(classify(&e)),
            Err(_) => Err(BackendError::Unavailable(format!(
                "connect timed out after {}ms",
                self.connect_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    type Connection = MySqlConnection;

    async fn connect(&self) -> Result<MySqlConnection, BackendError> {
        if let Some(ref breaker) = self.circuit_breaker {
            if !breaker.allow_request() {
                return Err(BackendError::Unavailable(
                    "circuit breaker open".to_string(),
                ));
            }
        }

        let result = self.open().await;

        if let Some(ref breaker) = self.circuit_breaker {
            match result {
                Ok(_) => breaker.record_success(),
                Err(BackendError::Unavailable(_)) => breaker.record_failure(),
                Err(_) => {}
            }
        }

        if let Err(ref e) = result {
            tracing::debug!(url = %self.url, error = %e, "MySQL connect failed");
        }
        result
    }

    async fn probe(&self, conn: &mut MySqlConnection) -> Result<(), BackendError> {
        conn.ping()
            .await
            .map_err(|e| BackendError::Probe(e.to_string()))
    }

    async fn close(&self, conn: MySqlConnection) {
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "MySQL connection did not close cleanly");
        }
    }
}

/// Sort a driver error into configuration rejections and transient failures.
fn classify(err: &sqlx::Error) -> BackendError {
    match err {
        sqlx::Error::Configuration(_) => BackendError::Rejected(err.to_string()),
        sqlx::Error::Database(db_err) => {
            let rejected = db_err
                .try_downcast_ref::<MySqlDatabaseError>()
                .is_some_and(|e| is_rejection(e.number()));
            if rejected {
                BackendError::Rejected(db_err.message().to_string())
            } else {
                BackendError::Unavailable(db_err.message().to_string())
            }
        }
        _ => BackendError::Unavailable(err.to_string()),
    }
}

fn is_rejection(number: u16) -> bool {
    matches!(number, ER_DBACCESS_DENIED | ER_ACCESS_DENIED | ER_BAD_DB)
}
