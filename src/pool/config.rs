//! Pool configuration.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::PoolError;

/// Connection pool configuration.
///
/// Immutable once the pool is constructed. Field names mirror the
/// `DB_*` environment variables the settings loader maps onto them.
#[derive(Clone, Deserialize)]
pub struct PoolConfig {
    /// Database server host
    #[serde(default = "default_host")]
    pub host: String,
    /// Database server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    #[serde(default = "default_user")]
    pub user: String,
    /// Login password (never logged)
    #[serde(default)]
    pub password: Option<String>,
    /// Default schema
    #[serde(default = "default_database")]
    pub database: String,
    /// Upper bound on idle + in-use + connecting connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum queued acquisitions when saturated (0 = unbounded)
    #[serde(default)]
    pub max_waiters: usize,
    /// Timeout for a single connect attempt in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Default total wait for `acquire()` in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Connections opened eagerly at construction
    #[serde(default)]
    pub warm_up: usize,
    /// Idle connections older than this are closed instead of reused
    #[serde(default)]
    pub idle_timeout_seconds: Option<u64>,
    /// Connections older than this are closed instead of reused
    #[serde(default)]
    pub max_lifetime_seconds: Option<u64>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_database() -> String {
    "academia_final".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl PoolConfig {
    /// Check the limits and identity fields, rejecting configurations the
    /// pool cannot honour.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Config(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.warm_up > self.max_connections {
            return Err(PoolError::Config(format!(
                "warm_up ({}) must not exceed max_connections ({})",
                self.warm_up, self.max_connections
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(PoolError::Config(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(PoolError::Config(
                "acquire_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(PoolError::Config("host must not be empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(PoolError::Config("user must not be empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(PoolError::Config("database must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds.map(Duration::from_secs)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_seconds.map(Duration::from_secs)
    }

    /// Connection URL with the password masked, safe for logs.
    pub fn masked_url(&self) -> String {
        let credentials = match self.password {
            Some(ref password) if !password.is_empty() => format!("{}:***", self.user),
            _ => self.user.clone(),
        };
        format!(
            "mysql://{}@{}:{}/{}",
            credentials, self.host, self.port, self.database
        )
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: None,
            database: default_database(),
            max_connections: default_max_connections(),
            max_waiters: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            warm_up: 0,
            idle_timeout_seconds: None,
            max_lifetime_seconds: None,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("max_waiters", &self.max_waiters)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("warm_up", &self.warm_up)
            .field("idle_timeout_seconds", &self.idle_timeout_seconds)
            .field("max_lifetime_seconds", &self.max_lifetime_seconds)
            .finish()
    }
}
