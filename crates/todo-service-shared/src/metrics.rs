//! Prometheus metrics for the todo service.
//!
//! The recorder is process-global: [`init_metrics`] installs it once and
//! [`metrics_handler`] renders it at [`MetricsConfig::path`]. Until then every
//! `record_*` helper is a no-op.
//!
//! ```no_run
//! use todo_service_shared::{init_metrics, MetricsConfig};
//!
//! if let Err(e) = init_metrics(&MetricsConfig::from_env()) {
//!     eprintln!("running without metrics: {e}");
//! }
//! ```

use futures::future::{BoxFuture, FutureExt};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;

use todo_lib::{ConnectionError, Connector, StoreHandle};

static RECORDER: OnceCell<PrometheusHandle> = OnceCell::new();

/// Scrape endpoint settings, from `METRICS_ENABLED` and `METRICS_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Must start with `/`; anything else falls back to the default.
    pub path: String,
}

impl MetricsConfig {
    pub const DEFAULT_PATH: &'static str = "/metrics";

    pub fn from_env() -> Self {
        let enabled = !matches!(
            std::env::var("METRICS_ENABLED").map(|v| v.trim().to_ascii_lowercase()),
            Ok(v) if v == "false" || v == "0"
        );
        let path = std::env::var("METRICS_PATH")
            .ok()
            .filter(|p| p.starts_with('/'))
            .unwrap_or_else(|| Self::DEFAULT_PATH.to_string());
        Self { enabled, path }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Self::DEFAULT_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("metrics are disabled")]
    Disabled,
    #[error("metrics recorder already initialized")]
    AlreadyInitialized,
    #[error("failed to install metrics recorder: {0}")]
    InstallFailed(String),
}

/// Install the Prometheus recorder. Only the first successful call installs.
pub fn init_metrics(config: &MetricsConfig) -> Result<&'static PrometheusHandle, MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }
    if RECORDER.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }
    RECORDER.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| MetricsError::InstallFailed(e.to_string()))
    })
}

/// Prometheus text exposition of everything recorded so far.
pub async fn metrics_handler() -> String {
    match RECORDER.get() {
        Some(handle) => handle.render(),
        None => "# metrics recorder not installed\n".to_string(),
    }
}

// =============================================================================
// Business Metrics Helpers
// =============================================================================

/// Increments `todo_auth_events_total`.
///
/// * `action` - "register", "login", or "authenticate"
/// * `outcome` - "success" or a short failure reason
pub fn record_auth_event(action: &'static str, outcome: &'static str) {
    metrics::counter!(
        "todo_auth_events_total",
        "action" => action,
        "outcome" => outcome
    )
    .increment(1);
}

/// Increments `todo_operations_total`.
pub fn record_todo_operation(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "todo_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Increments `todo_response_commits_total`.
///
/// * `source` - which path proposed the response (application, timeout, ...)
/// * `result` - "committed" for the winner, "ignored" for late proposals
pub fn record_response_commit(source: &'static str, result: &'static str) {
    metrics::counter!(
        "todo_response_commits_total",
        "source" => source,
        "result" => result
    )
    .increment(1);
}

/// Increments `todo_db_connect_attempts_total`.
pub fn record_connect_attempt(outcome: &'static str) {
    metrics::counter!("todo_db_connect_attempts_total", "outcome" => outcome).increment(1);
}

/// Short outcome label for a library error.
pub fn outcome_label(error: &todo_lib::Error) -> &'static str {
    use todo_lib::Error;
    match error {
        Error::Validation { .. } => "invalid",
        Error::DuplicateEmail => "duplicate",
        Error::InvalidCredentials | Error::Unauthorized { .. } | Error::Token(_) => "unauthorized",
        Error::NotFound { .. } => "not_found",
        Error::Connection(_) => "unavailable",
        _ => "error",
    }
}

/// Connector wrapper that counts every connect attempt by outcome.
pub struct MeteredConnector<C> {
    inner: C,
}

impl<C: Connector> MeteredConnector<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Connector> Connector for MeteredConnector<C> {
    fn connect(&self) -> BoxFuture<'static, Result<StoreHandle, ConnectionError>> {
        self.inner
            .connect()
            .inspect(|result| {
                record_connect_attempt(if result.is_ok() { "success" } else { "failure" });
            })
            .boxed()
    }

    fn target(&self) -> String {
        self.inner.target()
    }
}
