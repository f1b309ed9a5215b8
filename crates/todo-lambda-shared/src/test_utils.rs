//! Test utilities for Lambda handler testing.
//!
//! Gateway event builders, mock invocation contexts, and small scripted
//! applications for exercising the shim without a real router.
//!
//! ```ignore
//! use todo_lambda_shared::test_utils::{api_event, mock_lambda_event};
//!
//! let event = mock_lambda_event(api_event("GET", "/health"), "abc");
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http::{Request, Response};
use lambda_runtime::{Context, LambdaEvent};
use serde_json::{json, Value};

use todo_lib::Connector;
use todo_service_shared::test_utils::{test_router, test_state_with};

use crate::adapter::{Application, ApplicationError};
use crate::event::{GatewayEvent, GatewayResponse};
use crate::gate::ResponseSink;
use crate::shim::Shim;

/// Deterministic request id for assertions.
pub fn mock_request_id(suffix: &str) -> String {
    format!("test-request-{suffix}")
}

/// Wrap `payload` in an invocation with the given platform request id and no
/// deadline.
pub fn mock_lambda_event(payload: Value, suffix: &str) -> LambdaEvent<Value> {
    let mut context = Context::default();
    context.request_id = mock_request_id(suffix);
    LambdaEvent::new(payload, context)
}

/// HTTP API (payload v2) event with no body.
pub fn api_event(method: &str, path: &str) -> Value {
    json!({
        "version": "2.0",
        "rawPath": path,
        "headers": {},
        "requestContext": {"http": {"method": method, "path": path}},
        "isBase64Encoded": false
    })
}

/// HTTP API event carrying a JSON body and, optionally, a bearer token.
pub fn json_event(method: &str, path: &str, body: &Value, token: Option<&str>) -> Value {
    let mut event = api_event(method, path);
    event["body"] = Value::String(body.to_string());
    event["headers"]["content-type"] = json!("application/json");
    if let Some(token) = token {
        event["headers"]["authorization"] = json!(format!("Bearer {token}"));
    }
    event
}

/// REST API (payload v1) event.
pub fn rest_event(method: &str, path: &str) -> Value {
    json!({
        "httpMethod": method,
        "path": path,
        "headers": {},
        "requestContext": {"requestId": "gw-request"},
        "isBase64Encoded": false
    })
}

/// Parse a payload built by the helpers above.
pub fn gateway_event(payload: Value) -> GatewayEvent {
    serde_json::from_value(payload).expect("gateway event should deserialize")
}

/// Shim over the real router and an arbitrary connector.
pub fn test_shim(connector: impl Connector) -> Shim<axum::Router> {
    let state = test_state_with(connector);
    let router = test_router(state.clone());
    Shim::new(state, router)
}

/// Sink that keeps the status of every response written.
#[derive(Debug, Default)]
pub struct RecordingSink {
    statuses: Mutex<Vec<u16>>,
}

impl RecordingSink {
    pub fn statuses(&self) -> Vec<u16> {
        self.statuses.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn writes(&self) -> usize {
        self.statuses().len()
    }
}

impl ResponseSink for RecordingSink {
    fn write(&self, response: &GatewayResponse) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push(response.status_code);
        }
    }
}

/// How a [`ScriptedApp`] behaves when called.
#[derive(Debug, Clone)]
pub enum AppBehavior {
    /// Respond immediately with this status.
    Respond(u16),
    /// Respond after sleeping.
    Delayed(Duration, u16),
    /// Never respond.
    Hang,
    /// Return an application error.
    Fail(String),
    /// Panic inside the handler.
    Panic(String),
}

/// Application with scripted behavior that counts how often it was called.
#[derive(Debug)]
pub struct ScriptedApp {
    behavior: AppBehavior,
    calls: Arc<AtomicUsize>,
}

impl ScriptedApp {
    pub fn new(behavior: AppBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter, readable after the app has moved into a shim.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Application for ScriptedApp {
    async fn handle(&self, _: Request<Body>) -> Result<Response<Body>, ApplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = match &self.behavior {
            AppBehavior::Respond(status) => *status,
            AppBehavior::Delayed(delay, status) => {
                tokio::time::sleep(*delay).await;
                *status
            }
            AppBehavior::Hang => futures::future::pending::<u16>().await,
            AppBehavior::Fail(message) => return Err(ApplicationError(message.clone())),
            AppBehavior::Panic(message) => panic!("{message}"),
        };
        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"ok":true}"#))
            .map_err(|e| ApplicationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_lib::test_utils::ScriptedConnector;

    #[test]
    fn test_mock_request_id() {
        assert_eq!(mock_request_id("abc"), "test-request-abc");
    }

    #[test]
    fn test_event_builders_deserialize() {
        let v2 = gateway_event(json_event("POST", "/api/todos", &json!({"title": "x"}), Some("t")));
        assert_eq!(v2.method(), "POST");
        assert_eq!(v2.path(), "/api/todos");
        assert_eq!(v2.body_bytes().unwrap(), br#"{"title":"x"}"#.to_vec());

        let v1 = gateway_event(rest_event("delete", "/api/todos/1"));
        assert_eq!(v1.method(), "DELETE");
        assert_eq!(v1.gateway_request_id(), Some("gw-request"));
    }

    #[tokio::test]
    async fn test_scripted_app_counts_calls() {
        let app = ScriptedApp::new(AppBehavior::Respond(201));
        let calls = app.calls();
        let response = app.handle(Request::new(Body::empty())).await.unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shim_serves_health() {
        let shim = test_shim(ScriptedConnector::succeeding());
        let response = shim
            .handle(gateway_event(api_event("GET", "/health")), "req", None)
            .await;
        assert_eq!(response.status_code, 200);
    }
}
