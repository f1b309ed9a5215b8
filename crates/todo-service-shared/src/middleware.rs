//! HTTP middleware for the todo service.
//!
//! This module provides:
//! - [`RequestId`]: correlation id, taken from `x-request-id` or generated (UUID v7)
//! - [`request_context`]: stamps the id on request and response and completes
//!   error envelopes with `path`, `method`, and `requestId`
//! - [`MetricsLayer`]: Tower middleware recording HTTP metrics

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tracing::{info_span, Span};
use uuid::Uuid;

use crate::problem::ApiError;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new UUID v7 request ID.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The `x-request-id` header if present and non-empty, else a new UUID v7.
pub fn extract_or_generate_request_id(headers: &HeaderMap) -> RequestId {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(RequestId::from)
        .unwrap_or_else(RequestId::generate)
}

/// Route label for a request path, from a fixed set so label cardinality
/// stays bounded.
pub fn route_label(path: &str) -> &'static str {
    let path = path.split('?').next().unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => "/",
        "/health" => "/health",
        "/health-checks" => "/health-checks",
        "/favicon.ico" | "/favicon.png" => "/favicon",
        "/metrics" => "/metrics",
        "/api/auth/register" => "/api/auth/register",
        "/api/auth/login" => "/api/auth/login",
        "/api/auth/profile" => "/api/auth/profile",
        "/api/todos" => "/api/todos",
        p if p.starts_with("/api/todos/") && !p["/api/todos/".len()..].contains('/') => {
            "/api/todos/:id"
        }
        _ => "unmatched",
    }
}

fn status_class(status: u16) -> &'static str {
    match status / 100 {
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}

/// Axum middleware: attach the request id and complete error envelopes.
///
/// Use with `axum::middleware::from_fn`. Must wrap [`MetricsLayer`] so the
/// metrics span sees the same id.
pub async fn request_context(mut req: Request, next: Next) -> Response<Body> {
    let request_id = extract_or_generate_request_id(req.headers());
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        req.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Some(error) = response.extensions_mut().remove::<ApiError>() {
        response = error
            .with_request(method, path, request_id.as_str())
            .into_response();
        response.extensions_mut().remove::<ApiError>();
    }

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Tower layer recording `todo_http_requests_total` and
/// `todo_http_request_duration_seconds` per method and route.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

#[derive(Debug, Clone)]
struct RequestLabels {
    method: Method,
    route: &'static str,
    started: Instant,
}

impl RequestLabels {
    fn record(&self, status: u16) {
        let elapsed = self.started.elapsed();
        let method = self.method.as_str().to_string();
        metrics::counter!(
            "todo_http_requests_total",
            "method" => method.clone(),
            "route" => self.route,
            "status" => status_class(status)
        )
        .increment(1);
        metrics::histogram!(
            "todo_http_request_duration_seconds",
            "method" => method,
            "route" => self.route
        )
        .record(elapsed.as_secs_f64());

        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if status >= 500 {
            tracing::warn!(status, duration_ms, "request failed");
        } else {
            tracing::info!(status, duration_ms, "request completed");
        }
    }
}

impl<S, ReqBody, ResBody> Service<axum::http::Request<ReqBody>> for MetricsService<S>
where
    S: Service<axum::http::Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: http_body::Body + Send + 'static,
    ResBody: http_body::Body + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = MetricsFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: axum::http::Request<ReqBody>) -> Self::Future {
        let labels = RequestLabels {
            method: req.method().clone(),
            route: route_label(req.uri().path()),
            started: Instant::now(),
        };
        let span = info_span!(
            "request",
            request_id = %extract_or_generate_request_id(req.headers()),
            method = %labels.method,
            route = labels.route,
        );
        let inner = span.in_scope(|| self.inner.call(req));
        MetricsFuture {
            inner,
            labels,
            span,
        }
    }
}

pin_project! {
    pub struct MetricsFuture<F> {
        #[pin]
        inner: F,
        labels: RequestLabels,
        span: Span,
    }
}

impl<F, ResBody, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _entered = this.span.enter();
        let result = std::task::ready!(this.inner.poll(cx));
        this.labels.record(match &result {
            Ok(response) => response.status().as_u16(),
            Err(_) => 500,
        });
        Poll::Ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generate() {
        let id1 = RequestId::generate();
        let id2 = RequestId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 36);
    }

    #[test]
    fn test_extract_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Request-ID", HeaderValue::from_static("test-123"));
        assert_eq!(extract_or_generate_request_id(&headers).as_str(), "test-123");
    }

    #[test]
    fn test_extract_request_id_generates_when_blank() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("  "));
        assert_eq!(extract_or_generate_request_id(&headers).as_str().len(), 36);
    }

    #[test]
    fn test_route_label() {
        assert_eq!(route_label("/api/todos"), "/api/todos");
        assert_eq!(route_label("/api/todos/?x=1"), "/api/todos");
        assert_eq!(route_label("/api/todos/0190-abc"), "/api/todos/:id");
        assert_eq!(route_label("/api/todos/a/b"), "unmatched");
        assert_eq!(route_label("/favicon.png"), "/favicon");
        assert_eq!(route_label("/"), "/");
        assert_eq!(route_label("/wp-admin"), "unmatched");
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(204), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
        assert_eq!(status_class(99), "other");
    }
}
