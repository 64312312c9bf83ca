//! The data-store seam the pool delegates connect, probe and close to.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`Backend`].
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The server refused the configuration itself (credentials, schema).
    /// Retrying with the same configuration cannot succeed.
    #[error("Backend rejected configuration: {0}")]
    Rejected(String),

    /// Transient failure reaching the server
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Liveness probe on an existing connection failed
    #[error("Liveness probe failed: {0}")]
    Probe(String),
}

impl BackendError {
    /// Whether this error should abort pool construction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Rejected(_))
    }
}

/// Client for the backing data store.
///
/// The pool never interprets connections; it only opens them, checks them
/// and closes them through this trait.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Live session type handed out by the pool.
    type Connection: Send + 'static;

    /// Open a new session.
    async fn connect(&self) -> Result<Self::Connection, BackendError>;

    /// Lightweight liveness check on an existing session.
    async fn probe(&self, conn: &mut Self::Connection) -> Result<(), BackendError>;

    /// Close a session. Errors are the backend's to log.
    async fn close(&self, conn: Self::Connection);
}
