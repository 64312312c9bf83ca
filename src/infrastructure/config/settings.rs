use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::infrastructure::resilience::{BackoffConfig, CircuitBreakerConfig};
use crate::pool::PoolConfig;

/// Flat environment names accepted alongside the layered `SECTION__KEY` form.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DB_HOST", "db.host"),
    ("DB_PORT", "db.port"),
    ("DB_USER", "db.user"),
    ("DB_PASSWORD", "db.password"),
    ("DB_NAME", "db.database"),
    ("DB_MAX_CONNECTIONS", "db.max_connections"),
    ("DB_MAX_WAITERS", "db.max_waiters"),
    ("DB_CONNECT_TIMEOUT_MS", "db.connect_timeout_ms"),
    ("DB_ACQUIRE_TIMEOUT_MS", "db.acquire_timeout_ms"),
    ("DB_WARM_UP", "db.warm_up"),
    ("DB_IDLE_TIMEOUT_SECONDS", "db.idle_timeout_seconds"),
    ("DB_MAX_LIFETIME_SECONDS", "db.max_lifetime_seconds"),
    ("SERVER_HOST", "server.host"),
    ("SERVER_PORT", "server.port"),
    ("STARTUP_FAIL_FAST", "startup.fail_fast"),
    ("STARTUP_RETRIES", "startup.retries"),
    ("LOG_FORMAT", "logging.format"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub db: PoolConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Admin HTTP surface
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long shutdown waits for checked-out connections to come back
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

/// One-shot connectivity check run before serving
#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    /// Abort startup when the database stays unreachable
    #[serde(default)]
    pub fail_fast: bool,
    /// Extra attempts after the first failure
    #[serde(default = "default_startup_retries")]
    pub retries: u32,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_drain_timeout() -> u64 {
    10
}

fn default_startup_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build settings from an explicit set of environment variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let run_mode = vars
            .get("RUN_MODE")
            .map(String::as_str)
            .unwrap_or("development");

        let mut builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("db.host", "localhost")?
            .set_default("db.user", "root")?
            .set_default("db.database", "academia_final")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // DB__MAX_CONNECTIONS, SERVER__PORT, BREAKER__FAILURE_THRESHOLD, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone().into_iter().collect())),
            );

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, vars.get(*var).cloned())?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.server.drain_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            retries: default_startup_retries(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_values() {
        let settings = Settings::from_vars(&HashMap::new()).unwrap();

        assert_eq!(settings.db.host, "localhost");
        assert_eq!(settings.db.user, "root");
        assert_eq!(settings.db.database, "academia_final");
        assert_eq!(settings.db.max_connections, 10);
        assert_eq!(settings.db.max_waiters, 0);
        assert!(settings.db.password.is_none());
        assert_eq!(settings.server_addr(), "0.0.0.0:8081");
        assert!(!settings.startup.fail_fast);
        assert_eq!(settings.logging.format, LogFormat::Plain);
    }

    #[test]
    fn test_flat_db_variables() {
        let settings = Settings::from_vars(&vars(&[
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "3307"),
            ("DB_USER", "academia"),
            ("DB_PASSWORD", "s3cret"),
            ("DB_NAME", "academia_test"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("DB_MAX_WAITERS", "16"),
            ("DB_IDLE_TIMEOUT_SECONDS", "300"),
        ]))
        .unwrap();

        assert_eq!(settings.db.host, "db.internal");
        assert_eq!(settings.db.port, 3307);
        assert_eq!(settings.db.user, "academia");
        assert_eq!(settings.db.password.as_deref(), Some("s3cret"));
        assert_eq!(settings.db.database, "academia_test");
        assert_eq!(settings.db.max_connections, 4);
        assert_eq!(settings.db.max_waiters, 16);
        assert_eq!(settings.db.idle_timeout_seconds, Some(300));
    }

    #[test]
    fn test_startup_and_logging_variables() {
        let settings = Settings::from_vars(&vars(&[
            ("STARTUP_FAIL_FAST", "true"),
            ("STARTUP_RETRIES", "0"),
            ("LOG_FORMAT", "json"),
            ("SERVER_PORT", "9090"),
        ]))
        .unwrap();

        assert!(settings.startup.fail_fast);
        assert_eq!(settings.startup.retries, 0);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.server.port, 9090);
    }

    #[test]
    fn test_nested_variables() {
        let settings = Settings::from_vars(&vars(&[
            ("BREAKER__FAILURE_THRESHOLD", "9"),
            ("SERVER__DRAIN_TIMEOUT_SECONDS", "3"),
        ]))
        .unwrap();

        assert_eq!(settings.breaker.failure_threshold, 9);
        assert_eq!(settings.drain_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_number_is_error() {
        let result = Settings::from_vars(&vars(&[("DB_PORT", "not-a-port")]));
        assert!(result.is_err());
    }
}
