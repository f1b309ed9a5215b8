//! Structured logging for the HTTP service.
//!
//! | Variable | Effect |
//! |---|---|
//! | `LOG_FORMAT` | `json` (default) or `text`/`pretty` |
//! | `RUST_LOG` | filter directives; overrides [`LoggingConfig::filter`] |
//! | `SERVICE_NAME` | `service` field on the root span |
//!
//! ```no_run
//! use todo_service_shared::{init_logging, LoggingConfig};
//!
//! let config = LoggingConfig::from_env().with_service("todo-api");
//! let _ = init_logging(&config);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,tower_http=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, event fields flattened to the top level.
    #[default]
    Json,
    /// Compact single-line text for local development.
    Text,
}

impl LogFormat {
    /// Accepts "json", "text", or "pretty" (alias for text). Anything else is JSON.
    pub fn parse(s: &str) -> Self {
        if ["text", "pretty"].contains(&s.trim().to_ascii_lowercase().as_str()) {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
    pub service: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: DEFAULT_FILTER.to_string(),
            service: None,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            format: env("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            filter: env("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            service: env("SERVICE_NAME"),
        }
    }

    /// Fallback service name; an explicit `SERVICE_NAME` wins.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service.get_or_insert_with(|| service.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingError(String);

/// Install the global subscriber.
///
/// Fails if one is already installed, e.g. by a test harness.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        LogFormat::Text => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };
    installed.map_err(|e| LoggingError(e.to_string()))
}
