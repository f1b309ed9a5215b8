//! Runtime configuration read from the environment.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: document store location (default: in-memory)
//! - `JWT_SECRET`: token signing secret (no default)
//! - `JWT_EXPIRES_IN`: token lifetime such as `7d` or `12h` (default: `7d`)
//! - `REQUEST_TIMEOUT_MS`: per-request deadline (default: 10000)
//! - `CONNECT_TIMEOUT_MS`: database connect budget (default: 5000)
//! - `BCRYPT_COST`: password hashing cost (default: 10)
//! - `SERVICE_PORT`: HTTP listen port (default: 3001)
//! - `APP_ENV`: environment label reported by `/health-checks` (default: `development`)

use std::time::Duration;

use thiserror::Error;

use todo_lib::auth::{DEFAULT_BCRYPT_COST, DEFAULT_TOKEN_TTL};
use todo_lib::parse_ttl;

/// Store location used when `DATABASE_URL` is unset.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_PORT: u16 = 3001;

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub token_ttl: Duration,
    pub request_timeout: Duration,
    /// Always strictly below `request_timeout`.
    pub connect_timeout: Duration,
    pub bcrypt_cost: u32,
    pub port: u16,
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: None,
            token_ttl: DEFAULT_TOKEN_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            port: DEFAULT_PORT,
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let token_ttl = match get("JWT_EXPIRES_IN") {
            Some(raw) => parse_ttl(&raw).ok_or(ConfigError::Invalid {
                var: "JWT_EXPIRES_IN",
                expected: "a duration like 7d, 12h, 30m or 3600",
                value: raw,
            })?,
            None => defaults.token_ttl,
        };
        let request_timeout = parse_millis("REQUEST_TIMEOUT_MS", get("REQUEST_TIMEOUT_MS"))?
            .unwrap_or(defaults.request_timeout);
        let connect_timeout = parse_millis("CONNECT_TIMEOUT_MS", get("CONNECT_TIMEOUT_MS"))?
            .unwrap_or(defaults.connect_timeout);
        let bcrypt_cost = parse_number::<u32>("BCRYPT_COST", get("BCRYPT_COST"))?
            .unwrap_or(defaults.bcrypt_cost);
        let port =
            parse_number::<u16>("SERVICE_PORT", get("SERVICE_PORT"))?.unwrap_or(defaults.port);

        let mut config = Self {
            database_url: get("DATABASE_URL"),
            jwt_secret: get("JWT_SECRET"),
            token_ttl,
            request_timeout,
            connect_timeout,
            bcrypt_cost,
            port,
            environment: get("APP_ENV").unwrap_or(defaults.environment),
        };
        config.clamp_connect_timeout();
        Ok(config)
    }

    /// Store location, falling back to an in-memory database.
    pub fn database_url(&self) -> &str {
        self.database_url.as_deref().unwrap_or(IN_MEMORY_DATABASE)
    }

    /// Names of required variables that were not provided.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.database_url.is_none() {
            missing.push("DATABASE_URL");
        }
        if self.jwt_secret.is_none() {
            missing.push("JWT_SECRET");
        }
        missing
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    pub fn with_timeouts(mut self, request: Duration, connect: Duration) -> Self {
        self.request_timeout = request;
        self.connect_timeout = connect;
        self.clamp_connect_timeout();
        self
    }

    fn clamp_connect_timeout(&mut self) {
        if self.connect_timeout >= self.request_timeout {
            let clamped = self.request_timeout / 2;
            tracing::warn!(
                connect_ms = u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                request_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                clamped_ms = u64::try_from(clamped.as_millis()).unwrap_or(u64::MAX),
                "connect timeout must be below request timeout; clamping"
            );
            self.connect_timeout = clamped;
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            var,
            expected: "a non-negative integer",
            value,
        })
    })
    .transpose()
}

fn parse_millis(var: &'static str, raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    match parse_number::<u64>(var, raw)? {
        Some(0) => Err(ConfigError::Invalid {
            var,
            expected: "a positive number of milliseconds",
            value: "0".to_string(),
        }),
        other => Ok(other.map(Duration::from_millis)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.token_ttl, DEFAULT_TOKEN_TTL);
        assert_eq!(config.port, 3001);
        assert_eq!(config.database_url(), IN_MEMORY_DATABASE);
        assert_eq!(config.missing_required(), vec!["DATABASE_URL", "JWT_SECRET"]);
    }

    #[test]
    fn test_values_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite:///tmp/todo.db"),
            ("JWT_SECRET", "s3cret"),
            ("JWT_EXPIRES_IN", "12h"),
            ("REQUEST_TIMEOUT_MS", "8000"),
            ("CONNECT_TIMEOUT_MS", "3000"),
            ("BCRYPT_COST", "6"),
            ("SERVICE_PORT", "8080"),
            ("APP_ENV", "production"),
        ]))
        .unwrap();
        assert_eq!(config.database_url(), "sqlite:///tmp/todo.db");
        assert_eq!(config.token_ttl, Duration::from_secs(12 * 3600));
        assert_eq!(config.request_timeout, Duration::from_millis(8000));
        assert_eq!(config.connect_timeout, Duration::from_millis(3000));
        assert_eq!(config.bcrypt_cost, 6);
        assert_eq!(config.port, 8080);
        assert_eq!(config.environment, "production");
        assert!(config.missing_required().is_empty());
    }

    #[test]
    fn test_connect_timeout_is_clamped_below_request_timeout() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REQUEST_TIMEOUT_MS", "4000"),
            ("CONNECT_TIMEOUT_MS", "9000"),
        ]))
        .unwrap();
        assert!(config.connect_timeout < config.request_timeout);
        assert_eq!(config.connect_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("REQUEST_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("REQUEST_TIMEOUT_MS"));

        let err = AppConfig::from_lookup(lookup(&[("CONNECT_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(err.to_string().contains("CONNECT_TIMEOUT_MS"));

        assert!(AppConfig::from_lookup(lookup(&[("JWT_EXPIRES_IN", "forever")])).is_err());
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "  ")])).unwrap();
        assert!(config.jwt_secret.is_none());
    }
}
