//! Bounded connection pool.
//!
//! A [`Pool`] lends out at most `max_connections` sessions from a
//! [`Backend`]. Callers that arrive while every connection is checked out
//! wait in arrival order; each waits at most its acquire timeout.

mod backend;
mod config;
mod connection;
mod error;
mod manager;
mod state;
mod stats;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{Backend, BackendError};
pub use config::PoolConfig;
pub use connection::PooledConnection;
pub use error::PoolError;
pub use manager::Pool;
pub use stats::PoolStats;
