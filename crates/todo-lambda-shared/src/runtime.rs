//! Process-lifetime state reused across warm invocations.
//!
//! The first invocation in a process builds the [`AppState`] (and with it the
//! single [`ConnectionGuard`](todo_lib::ConnectionGuard)) and the router. Later
//! invocations in the same process reuse both, so a connection established
//! once serves every request until the process is recycled. Nothing connects
//! here: the first request that needs the store does.

use std::sync::OnceLock;
use std::time::Instant;

use axum::Router;
use tracing::{error, info};

use todo_service_shared::{
    build_router, AppConfig, AppState, ConfigError, ErrorEnvelope, MetricsConfig,
};

use crate::event::GatewayResponse;
use crate::shim::Shim;

static RUNTIME: OnceLock<Result<LambdaRuntime, InitError>> = OnceLock::new();

/// Error during runtime initialization.
#[derive(Debug, Clone)]
pub struct InitError {
    pub message: String,
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lambda initialization failed: {}", self.message)
    }
}

impl std::error::Error for InitError {}

impl From<ConfigError> for InitError {
    fn from(err: ConfigError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

pub struct LambdaRuntime {
    shim: Shim<Router>,
}

impl LambdaRuntime {
    pub fn new(state: AppState) -> Self {
        // No Prometheus scrape endpoint inside Lambda.
        let metrics = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        let router = build_router(state.clone(), &metrics);
        Self {
            shim: Shim::new(state, router),
        }
    }

    pub fn shim(&self) -> &Shim<Router> {
        &self.shim
    }

    pub fn state(&self) -> &AppState {
        self.shim.state()
    }
}

/// Initialize from the environment on first call; later calls return the
/// same runtime (or the same error).
pub fn init_runtime() -> Result<&'static LambdaRuntime, InitError> {
    init_with(|| Ok(AppState::from_config(AppConfig::from_env()?)))
}

/// Initialize around an existing state. Ignored if already initialized.
pub fn init_runtime_with(state: AppState) -> Result<&'static LambdaRuntime, InitError> {
    init_with(|| Ok(state))
}

fn init_with(
    build: impl FnOnce() -> Result<AppState, InitError>,
) -> Result<&'static LambdaRuntime, InitError> {
    let result = RUNTIME.get_or_init(|| {
        let started = Instant::now();
        let state = build()?;

        let missing = state.config().missing_required();
        if !missing.is_empty() {
            error!(missing = ?missing, "required environment variables not set");
        }
        info!(
            database = %state.guard().target(),
            request_timeout_ms = u64::try_from(state.config().request_timeout.as_millis()).unwrap_or(u64::MAX),
            connect_timeout_ms = u64::try_from(state.config().connect_timeout.as_millis()).unwrap_or(u64::MAX),
            init_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Lambda runtime initialized"
        );
        Ok(LambdaRuntime::new(state))
    });

    match result {
        Ok(runtime) => Ok(runtime),
        Err(e) => {
            error!(error = %e, "Lambda runtime initialization failed");
            Err(e.clone())
        }
    }
}

/// The initialized runtime, if [`init_runtime`] succeeded.
pub fn get_runtime() -> Option<&'static LambdaRuntime> {
    RUNTIME.get().and_then(|r| r.as_ref().ok())
}

/// 500 response for an invocation that arrives after initialization failed.
pub fn init_error_response(error: &InitError, request_id: &str) -> GatewayResponse {
    let mut envelope = ErrorEnvelope::new("Internal server error", error.message.clone());
    envelope.request_id = Some(request_id.to_string());
    GatewayResponse::json(500, &envelope).with_header("x-request-id", request_id)
}

/// 400 response for a payload that is not a gateway event.
pub fn invalid_event_response(error: &serde_json::Error, request_id: &str) -> GatewayResponse {
    let mut envelope = ErrorEnvelope::new("Invalid request", format!("Invalid gateway event: {error}"));
    envelope.request_id = Some(request_id.to_string());
    GatewayResponse::json(400, &envelope).with_header("x-request-id", request_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_error_display() {
        let err = InitError {
            message: "test error".to_string(),
        };
        assert!(err.to_string().contains("test error"));
    }

    #[test]
    fn test_init_error_from_config_error() {
        let err: InitError = ConfigError::Invalid {
            var: "REQUEST_TIMEOUT_MS",
            expected: "a whole number of milliseconds",
            value: "soon".to_string(),
        }
        .into();
        assert!(err.message.contains("REQUEST_TIMEOUT_MS"));
    }

    #[test]
    fn test_init_error_response() {
        let err = InitError {
            message: "bad config".to_string(),
        };
        let response = init_error_response(&err, "req-1");
        assert_eq!(response.status_code, 500);
        let body = response.json_body().unwrap();
        assert_eq!(body["message"], "bad config");
        assert_eq!(body["requestId"], "req-1");
        assert!(body.get("path").is_none());
    }

    #[test]
    fn test_invalid_event_response() {
        let err = serde_json::from_str::<crate::event::GatewayEvent>("\"x\"").unwrap_err();
        let response = invalid_event_response(&err, "req-2");
        assert_eq!(response.status_code, 400);
        let body = response.json_body().unwrap();
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["requestId"], "req-2");
        assert!(body.get("method").is_none());
    }
}
