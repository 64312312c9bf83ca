//! Pool error type.

use thiserror::Error;

use super::BackendError;

/// Errors returned by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Opening a connection for this acquisition failed
    #[error("Failed to connect to database: {0}")]
    ConnectFailed(#[source] BackendError),

    /// Queue full or acquire timeout elapsed
    #[error(
        "Connection pool exhausted ({in_use}/{max_connections} in use, {waiters} waiting)"
    )]
    PoolExhausted {
        max_connections: usize,
        in_use: usize,
        waiters: usize,
    },

    /// Shutdown has begun; the pool will not hand out connections again
    #[error("Connection pool is closed")]
    PoolClosed,

    /// Handle already released or owned by another pool
    #[error("Connection handle is not checked out from this pool")]
    InvalidHandle,

    /// Configuration failed validation
    #[error("Invalid pool configuration: {0}")]
    Config(String),

    /// The backend refused the configuration during warm-up
    #[error("Database rejected pool configuration: {0}")]
    Rejected(#[source] BackendError),
}

impl PoolError {
    /// Whether the caller may reasonably retry `acquire`.
    pub fn is_retryable(&self) -> bool {
        match self {
            PoolError::ConnectFailed(inner) => !inner.is_fatal(),
            PoolError::PoolExhausted { .. } => true,
            _ => false,
        }
    }

    /// Whether the backend refused the configuration itself.
    pub fn is_rejection(&self) -> bool {
        match self {
            PoolError::ConnectFailed(inner) | PoolError::Rejected(inner) => inner.is_fatal(),
            _ => false,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::ConnectFailed(_) => "connect_failed",
            PoolError::PoolExhausted { .. } => "exhausted",
            PoolError::PoolClosed => "closed",
            PoolError::InvalidHandle => "invalid_handle",
            PoolError::Config(_) => "config",
            PoolError::Rejected(_) => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoolError::PoolExhausted {
            max_connections: 2,
            in_use: 2,
            waiters: 1,
        };
        assert_eq!(
            err.to_string(),
            "Connection pool exhausted (2/2 in use, 1 waiting)"
        );

        let err = PoolError::ConnectFailed(BackendError::Unavailable("refused".to_string()));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(PoolError::ConnectFailed(BackendError::Unavailable(String::new())).is_retryable());
        assert!(PoolError::PoolExhausted {
            max_connections: 1,
            in_use: 1,
            waiters: 0
        }
        .is_retryable());
        assert!(!PoolError::PoolClosed.is_retryable());
        assert!(!PoolError::InvalidHandle.is_retryable());
        assert!(!PoolError::Rejected(BackendError::Rejected(String::new())).is_retryable());
    }

    #[test]
    fn test_access_denied_is_not_retryable() {
        let err = PoolError::ConnectFailed(BackendError::Rejected(
            "Access denied for user 'root'@'localhost'".to_string(),
        ));
        assert!(!err.is_retryable());
        assert!(err.is_rejection());

        let err = PoolError::ConnectFailed(BackendError::Unavailable("refused".to_string()));
        assert!(!err.is_rejection());
        assert!(!PoolError::PoolClosed.is_rejection());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(PoolError::PoolClosed.kind(), "closed");
        assert_eq!(PoolError::InvalidHandle.kind(), "invalid_handle");
    }
}
