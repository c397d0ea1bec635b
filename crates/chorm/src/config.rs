//! Connection and polling configuration.

use crate::error::{ChormError, ChormResult};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment keys read by [`ClickHouseConfig::from_env`].
pub const ENV_HOST: &str = "CLICKHOUSE_HOST";
pub const ENV_PORT: &str = "CLICKHOUSE_PORT";
pub const ENV_USERNAME: &str = "CLICKHOUSE_USERNAME";
pub const ENV_PASSWORD: &str = "CLICKHOUSE_PASSWORD";
pub const ENV_DATABASE: &str = "CLICKHOUSE_DATABASE";

/// Interval between two `system.mutations` lookups.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Deadline applied to awaited mutations when the caller gives none.
pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(600);

static GLOBAL: OnceLock<ClickHouseConfig> = OnceLock::new();

/// Configuration for `ClickHouseClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Polling behaviour for awaitable mutations.
    pub await_policy: AwaitPolicy,
}

/// How awaitable mutations are polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for AwaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_AWAIT_TIMEOUT,
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            username: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            await_policy: AwaitPolicy::default(),
        }
    }
}

impl ClickHouseConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the HTTP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the interval between mutation status lookups.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.await_policy.poll_interval = interval;
        self
    }

    /// Set the default deadline for awaited mutations.
    pub fn await_timeout(mut self, timeout: Duration) -> Self {
        self.await_policy.timeout = timeout;
        self
    }

    /// `host:port` pair used to open sockets.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load the configuration from process environment variables.
    ///
    /// Every key is required; the first missing one is reported as
    /// [`ChormError::ConfigNotFound`].
    pub fn from_env() -> ChormResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ChormResult<Self> {
        let require = |key: &str| lookup(key).ok_or_else(|| ChormError::config_not_found(key));

        let host = require(ENV_HOST)?;
        let port = require(ENV_PORT)?;
        let username = require(ENV_USERNAME)?;
        let password = require(ENV_PASSWORD)?;
        let database = require(ENV_DATABASE)?;

        let port = port.trim().parse::<u16>().map_err(|_| {
            ChormError::ConfigNotFound(format!("{ENV_PORT} must be a port number, got `{port}`."))
        })?;

        Ok(Self {
            host,
            port,
            username,
            password,
            database,
            await_policy: AwaitPolicy::default(),
        })
    }

    /// Process-wide configuration, loaded once from `.env` and the environment.
    ///
    /// A failed load is not cached, so the error resurfaces on every call.
    pub fn global() -> ChormResult<&'static Self> {
        if let Some(config) = GLOBAL.get() {
            return Ok(config);
        }
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        Ok(GLOBAL.get_or_init(|| config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (ENV_HOST, "ch.internal"),
            (ENV_PORT, "8124"),
            (ENV_USERNAME, "reporter"),
            (ENV_PASSWORD, "secret"),
            (ENV_DATABASE, "analytics"),
        ])
    }

    #[test]
    fn test_config_defaults() {
        let config = ClickHouseConfig::default();
        assert_eq!(config.port, 8123);
        assert_eq!(config.await_policy.poll_interval, Duration::from_millis(500));
        assert_eq!(config.await_policy.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_config_builder() {
        let config = ClickHouseConfig::new()
            .host("db")
            .port(9000)
            .credentials("u", "p")
            .database("events")
            .poll_interval(Duration::from_millis(50))
            .await_timeout(Duration::from_secs(5));

        assert_eq!(config.address(), "db:9000");
        assert_eq!(config.username, "u");
        assert_eq!(config.password, "p");
        assert_eq!(config.database, "events");
        assert_eq!(config.await_policy.poll_interval, Duration::from_millis(50));
        assert_eq!(config.await_policy.timeout, Duration::from_secs(5));
    }

    #[test]
    fn from_lookup_reads_every_key() {
        let env = full_env();
        let config =
            ClickHouseConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.host, "ch.internal");
        assert_eq!(config.port, 8124);
        assert_eq!(config.username, "reporter");
        assert_eq!(config.password, "secret");
        assert_eq!(config.database, "analytics");
    }

    #[test]
    fn from_lookup_reports_missing_key() {
        let mut env = full_env();
        env.remove(ENV_PASSWORD);
        let err =
            ClickHouseConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(err.is_config_not_found());
        assert!(err.to_string().contains(ENV_PASSWORD));
    }

    #[test]
    fn from_lookup_rejects_bad_port() {
        let mut env = full_env();
        env.insert(ENV_PORT, "eighty");
        let err =
            ClickHouseConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert!(err.is_config_not_found());
    }
}
