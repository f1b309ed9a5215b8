//! Health, service root, favicon, and not-found handlers.
//!
//! `/health`, `/`, and the favicon routes never touch the database; the
//! serverless shim answers them itself using the same body builders.
//! `/health-checks` reports on the database, first making one bounded
//! connection attempt when the store is not connected.

use std::time::Duration;

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use todo_lib::ConnectionState;

use crate::middleware::RequestId;
use crate::state::AppState;

pub const SERVICE_MESSAGE: &str = "Todo API Backend";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    /// Seconds since the process started serving.
    pub uptime: f64,
}

impl HealthStatus {
    pub fn ok(uptime: Duration) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: timestamp(),
            uptime: uptime.as_secs_f64(),
        }
    }
}

/// `GET /` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub endpoints: Value,
    pub timestamp: String,
}

impl ServiceInfo {
    pub fn current() -> Self {
        Self {
            message: SERVICE_MESSAGE.to_string(),
            version: SERVICE_VERSION.to_string(),
            endpoints: endpoint_catalog(),
            timestamp: timestamp(),
        }
    }
}

/// Every endpoint the service exposes, grouped by area.
pub fn endpoint_catalog() -> Value {
    json!({
        "health": "GET /health",
        "healthChecks": "GET /health-checks",
        "auth": {
            "register": "POST /api/auth/register",
            "login": "POST /api/auth/login",
            "profile": "GET /api/auth/profile",
        },
        "todos": {
            "list": "GET /api/todos",
            "create": "POST /api/todos",
            "get": "GET /api/todos/:id",
            "update": "PUT /api/todos/:id",
            "delete": "DELETE /api/todos/:id",
        },
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::ok(state.uptime()))
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::current())
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// A single entry under `checks` in the `/health-checks` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

impl Check {
    fn new(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: Some(message.into()),
            state: None,
            used: None,
            unit: None,
            missing: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checks {
    pub api: Check,
    pub database: Check,
    pub memory: Check,
    pub environment: Check,
}

/// `GET /health-checks` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealth {
    /// "ok", "degraded", or "error".
    pub status: String,
    pub timestamp: String,
    pub uptime: f64,
    pub environment: String,
    pub version: String,
    pub checks: Checks,
}

impl DetailedHealth {
    pub fn http_status(&self) -> StatusCode {
        if self.status == "error" {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::OK
        }
    }
}

pub async fn health_checks(State(state): State<AppState>) -> Response {
    let guard = state.guard();
    if !guard.is_connected() {
        // Bounded by the connect budget; the report reflects whatever state results.
        let budget = state.config().connect_timeout;
        match tokio::time::timeout(budget, guard.ensure()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => debug!(error = %err, "health check connect failed"),
            Err(_) => debug!(
                budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                state = %guard.state(),
                "health check connect timed out"
            ),
        }
    }

    let report = build_report(&state);
    (report.http_status(), Json(report)).into_response()
}

fn build_report(state: &AppState) -> DetailedHealth {
    let mut status = "ok";

    let database = match state.guard().state() {
        ConnectionState::Connected => Check {
            state: Some("connected".to_string()),
            ..Check::new("ok", "Database connected")
        },
        ConnectionState::Connecting => {
            status = "degraded";
            Check {
                state: Some("connecting".to_string()),
                ..Check::new("warning", "Database connecting")
            }
        }
        ConnectionState::Disconnected => {
            status = "degraded";
            Check {
                state: Some("disconnected".to_string()),
                ..Check::new("error", "Database not connected")
            }
        }
        ConnectionState::Failed => {
            status = "error";
            let message = state
                .guard()
                .last_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Database connection failed".to_string());
            Check {
                state: Some("error".to_string()),
                ..Check::new("error", message)
            }
        }
    };

    let missing = state.config().missing_required();
    let environment = if missing.is_empty() {
        Check::new("ok", "All required environment variables are set")
    } else {
        if status == "ok" {
            status = "degraded";
        }
        Check {
            missing: Some(missing.iter().map(|s| s.to_string()).collect()),
            ..Check::new(
                "warning",
                format!("Missing environment variables: {}", missing.join(", ")),
            )
        }
    };

    DetailedHealth {
        status: status.to_string(),
        timestamp: timestamp(),
        uptime: state.uptime().as_secs_f64(),
        environment: state.config().environment.clone(),
        version: SERVICE_VERSION.to_string(),
        checks: Checks {
            api: Check::new("ok", "API is running"),
            database,
            memory: memory_check(),
            environment,
        },
    }
}

/// Resident set size of this process, when the platform exposes it.
fn memory_check() -> Check {
    match resident_memory_mb() {
        Some(used) => Check {
            message: None,
            used: Some(used),
            unit: Some("MB".to_string()),
            ..Check::new("ok", "")
        },
        None => Check::new("unknown", "Memory usage not available on this platform"),
    }
}

fn resident_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some((kb / 1024.0 * 100.0).round() / 100.0)
}

/// Fallback for unknown routes.
pub async fn not_found(
    method: Method,
    uri: Uri,
    request_id: Option<Extension<RequestId>>,
) -> Response {
    let path = uri.path();
    let mut body = json!({
        "error": "Route not found",
        "message": format!("The requested endpoint {method} {path} does not exist"),
        "path": path,
        "method": method.as_str(),
        "availableEndpoints": endpoint_catalog(),
        "timestamp": timestamp(),
    });
    if let Some(Extension(id)) = request_id {
        body["requestId"] = Value::String(id.0);
    }
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use todo_lib::test_utils::ScriptedConnector;

    #[test]
    fn test_health_status_serialization() {
        let json = serde_json::to_value(HealthStatus::ok(Duration::from_secs(2))).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["uptime"], 2.0);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_service_info_lists_endpoints() {
        let info = ServiceInfo::current();
        assert_eq!(info.message, SERVICE_MESSAGE);
        assert_eq!(info.endpoints["auth"]["profile"], "GET /api/auth/profile");
        assert_eq!(info.endpoints["todos"]["delete"], "DELETE /api/todos/:id");
    }

    #[tokio::test]
    async fn test_report_ok_when_connected_and_configured() {
        let config = AppConfig::default()
            .with_database_url("sqlite::memory:")
            .with_jwt_secret("secret");
        let state = AppState::with_connector(config, ScriptedConnector::succeeding());
        state.guard().ensure().await.unwrap();

        let report = build_report(&state);
        assert_eq!(report.status, "ok");
        assert_eq!(report.http_status(), StatusCode::OK);
        assert_eq!(report.checks.database.state.as_deref(), Some("connected"));
    }

    #[tokio::test]
    async fn test_report_degraded_on_missing_env() {
        let state = AppState::with_connector(AppConfig::default(), ScriptedConnector::succeeding());
        state.guard().ensure().await.unwrap();

        let report = build_report(&state);
        assert_eq!(report.status, "degraded");
        assert_eq!(report.http_status(), StatusCode::OK);
        assert_eq!(
            report.checks.environment.missing,
            Some(vec!["DATABASE_URL".to_string(), "JWT_SECRET".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_checks_gives_up_on_hanging_connect() {
        let config = AppConfig::default()
            .with_jwt_secret("s")
            .with_timeouts(Duration::from_secs(10), Duration::from_secs(2));
        let state = AppState::with_connector(config, ScriptedConnector::hanging());
        let started = tokio::time::Instant::now();

        let response = health_checks(State(state.clone())).await;

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(build_report(&state).checks.database.state.as_deref(), Some("connecting"));
    }

    #[tokio::test]
    async fn test_report_error_after_failed_connect() {
        let state = AppState::with_connector(
            AppConfig::default().with_jwt_secret("s"),
            ScriptedConnector::failing("connection refused"),
        );
        assert!(state.guard().ensure().await.is_err());

        let report = build_report(&state);
        assert_eq!(report.status, "error");
        assert_eq!(report.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(report.checks.database.message.unwrap().contains("refused"));
    }
}
