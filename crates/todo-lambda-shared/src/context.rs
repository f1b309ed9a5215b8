//! Per-invocation request view, computed once at entry.

use std::time::Duration;

use axum::body::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tokio::time::Instant;
use tracing::debug;

use todo_service_shared::REQUEST_ID_HEADER;

use crate::event::{EventError, GatewayEvent};

/// Immutable normalized request.
///
/// Method, path, query, headers, and body are read from the gateway event
/// exactly once; everything downstream (classifier, adapter, error bodies)
/// sees this single view.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: String,
    pub method: Method,
    /// Raw path as received. May be empty or malformed.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Always carries `x-request-id` equal to [`RequestContext::id`].
    pub headers: HeaderMap,
    pub body: Bytes,
    pub received_at: Instant,
    pub deadline: Instant,
}

impl RequestContext {
    /// Normalize `event`.
    ///
    /// The request id is the client's `x-request-id` header when present,
    /// else the gateway's id, else `platform_request_id`, else a fresh UUID.
    pub fn from_event(
        event: &GatewayEvent,
        platform_request_id: &str,
        budget: Duration,
    ) -> Result<Self, EventError> {
        let received_at = Instant::now();

        let raw_method = event.method();
        let method = Method::from_bytes(raw_method.as_bytes())
            .map_err(|_| EventError::InvalidMethod(raw_method.clone()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in event.header_pairs() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => debug!(header = %name, "dropping unrepresentable header"),
            }
        }

        let id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .or_else(|| event.gateway_request_id().map(str::to_string))
            .or_else(|| Some(platform_request_id.to_string()).filter(|id| !id.is_empty()))
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

        match HeaderValue::from_str(&id) {
            Ok(value) => {
                headers.insert(REQUEST_ID_HEADER, value);
            }
            Err(_) => {
                headers.remove(REQUEST_ID_HEADER);
            }
        }

        Ok(Self {
            id,
            method,
            path: event.path(),
            query: event.query_pairs()?,
            headers,
            body: Bytes::from(event.body_bytes()?),
            received_at,
            deadline: received_at + budget,
        })
    }

    /// Path plus encoded query string, as the application should see it.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        match serde_urlencoded::to_string(&self.query) {
            Ok(query) => format!("{}?{}", self.path, query),
            Err(_) => self.path.clone(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Time left before the request deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> GatewayEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_id_prefers_header() {
        let ev = event(json!({
            "rawPath": "/health",
            "headers": {"X-Request-Id": "client-1"},
            "requestContext": {"requestId": "gw-1"}
        }));
        let ctx = RequestContext::from_event(&ev, "lambda-1", Duration::from_secs(1)).unwrap();
        assert_eq!(ctx.id, "client-1");
    }

    #[test]
    fn test_request_id_falls_back_in_order() {
        let ev = event(json!({"rawPath": "/", "requestContext": {"requestId": "gw-1"}}));
        let ctx = RequestContext::from_event(&ev, "lambda-1", Duration::from_secs(1)).unwrap();
        assert_eq!(ctx.id, "gw-1");
        assert_eq!(ctx.headers.get(REQUEST_ID_HEADER).unwrap(), "gw-1");

        let ev = event(json!({"rawPath": "/"}));
        let ctx = RequestContext::from_event(&ev, "lambda-1", Duration::from_secs(1)).unwrap();
        assert_eq!(ctx.id, "lambda-1");

        let ctx = RequestContext::from_event(&ev, "", Duration::from_secs(1)).unwrap();
        assert!(!ctx.id.is_empty());
    }

    #[test]
    fn test_uri_encodes_query() {
        let ev = event(json!({
            "httpMethod": "GET",
            "path": "/api/todos",
            "queryStringParameters": {"q": "a b"}
        }));
        let ctx = RequestContext::from_event(&ev, "id", Duration::from_secs(1)).unwrap();
        assert_eq!(ctx.uri(), "/api/todos?q=a+b");
    }

    #[test]
    fn test_invalid_method_rejected() {
        let ev = event(json!({"httpMethod": "GE T", "path": "/"}));
        let err = RequestContext::from_event(&ev, "id", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, EventError::InvalidMethod(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_and_remaining() {
        let ev = event(json!({"rawPath": "/"}));
        let ctx = RequestContext::from_event(&ev, "id", Duration::from_secs(10)).unwrap();
        assert_eq!(ctx.remaining(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(ctx.remaining(), Duration::from_secs(6));
        assert_eq!(ctx.elapsed(), Duration::from_secs(4));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }
}
