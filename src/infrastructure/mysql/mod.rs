//! MySQL persistence module.
//!
//! Provides the sqlx-backed connection source the pool draws from.

mod backend;

pub use backend::MySqlBackend;
