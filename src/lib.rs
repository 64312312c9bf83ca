// Infrastructure layer (shared components)
pub mod infrastructure;

// Short paths for infrastructure modules
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::mysql;
pub use infrastructure::resilience;

// Domain layer
pub mod pool;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod shutdown;
pub mod startup;
pub mod telemetry;

pub use pool::{Backend, BackendError, Pool, PoolConfig, PoolError, PoolStats, PooledConnection};
