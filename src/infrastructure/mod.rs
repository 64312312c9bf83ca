//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `config`: Application configuration and settings
//! - `error`: Application error type and HTTP rendering
//! - `metrics`: Prometheus metrics helpers
//! - `mysql`: MySQL backend for the connection pool
//! - `resilience`: Connect circuit breaker and exponential backoff

pub mod config;
pub mod error;
pub mod metrics;
pub mod mysql;
pub mod resilience;
