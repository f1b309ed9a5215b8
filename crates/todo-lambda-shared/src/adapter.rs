//! Presents a [`RequestContext`] to the embedded application and proposes
//! its result to the [`ResponseGate`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use futures::FutureExt;
use http::header::CONTENT_TYPE;
use http::{Request, Response};
use http_body_util::BodyExt;
use thiserror::Error;
use tower::ServiceExt;
use tracing::{debug, error};

use todo_service_shared::ApiError;

use crate::context::RequestContext;
use crate::event::GatewayResponse;
use crate::gate::{CommitResult, CommitSource, ResponseGate, ResponseOutcome};

/// Failure raised by the application instead of a response.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ApplicationError(pub String);

impl From<String> for ApplicationError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ApplicationError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// The embedded HTTP application, treated as a black box.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, ApplicationError>;
}

#[async_trait]
impl Application for Router {
    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, ApplicationError> {
        match self.clone().oneshot(request).await {
            Ok(response) => Ok(response),
            Err(never) => match never {},
        }
    }
}

#[async_trait]
impl<A: Application + ?Sized> Application for Arc<A> {
    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, ApplicationError> {
        (**self).handle(request).await
    }
}

/// What the adapter proposed, and whether it won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterOutcome {
    Success { status: u16, commit: CommitResult },
    Failure { message: String, commit: CommitResult },
}

impl AdapterOutcome {
    pub fn commit(&self) -> CommitResult {
        match self {
            AdapterOutcome::Success { commit, .. } | AdapterOutcome::Failure { commit, .. } => {
                *commit
            }
        }
    }
}

pub struct Adapter<A> {
    app: Arc<A>,
}

impl<A> Clone for Adapter<A> {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
        }
    }
}

impl<A> std::fmt::Debug for Adapter<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter").finish_non_exhaustive()
    }
}

impl<A: Application> Adapter<A> {
    pub fn new(app: A) -> Self {
        Self { app: Arc::new(app) }
    }

    pub fn from_arc(app: Arc<A>) -> Self {
        Self { app }
    }

    /// Dispatch `ctx` and propose exactly one outcome to `gate`.
    ///
    /// An application error or panic becomes a 500 envelope. Proposals after
    /// the gate closed are no-ops.
    pub async fn invoke(&self, ctx: &RequestContext, gate: &ResponseGate) -> AdapterOutcome {
        let result = match build_request(ctx) {
            Ok(request) => AssertUnwindSafe(self.app.handle(request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(ApplicationError(panic_message(panic.as_ref())))),
            Err(err) => Err(ApplicationError(format!("cannot build request: {err}"))),
        };

        let response = match result {
            Ok(response) => collect_response(response).await,
            Err(err) => Err(err),
        };

        match response {
            Ok(response) => {
                let status = response.status_code;
                let commit = gate.commit(CommitSource::Application, ResponseOutcome::Success(response));
                AdapterOutcome::Success { status, commit }
            }
            Err(err) => {
                error!(
                    request_id = %ctx.id,
                    method = %ctx.method,
                    path = %ctx.path,
                    error = %err,
                    "application failed"
                );
                let commit = if gate.is_committed() {
                    debug!(request_id = %ctx.id, "response already sent; dropping error response");
                    gate.commit(
                        CommitSource::ApplicationError,
                        ResponseOutcome::Failure(GatewayResponse::empty(500)),
                    )
                } else {
                    gate.commit(
                        CommitSource::ApplicationError,
                        ResponseOutcome::Failure(failure_response(ctx, &err.0)),
                    )
                };
                AdapterOutcome::Failure {
                    message: err.0,
                    commit,
                }
            }
        }
    }
}

fn build_request(ctx: &RequestContext) -> Result<Request<Body>, http::Error> {
    let mut request = Request::builder()
        .method(ctx.method.clone())
        .uri(ctx.uri())
        .body(Body::from(ctx.body.clone()))?;
    *request.headers_mut() = ctx.headers.clone();
    Ok(request)
}

async fn collect_response(response: Response<Body>) -> Result<GatewayResponse, ApplicationError> {
    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| ApplicationError(format!("failed to read response body: {e}")))?
        .to_bytes();

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let mut out = GatewayResponse::from_bytes(parts.status.as_u16(), content_type, bytes.to_vec());

    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        if name == http::header::SET_COOKIE {
            out.cookies.push(value.to_string());
            continue;
        }
        out.headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    Ok(out)
}

/// 500 envelope for an application failure.
pub fn failure_response(ctx: &RequestContext, message: &str) -> GatewayResponse {
    let error = ApiError::internal(message).with_request(
        ctx.method.as_str(),
        ctx.path.as_str(),
        ctx.id.as_str(),
    );
    GatewayResponse::json(error.status.as_u16(), &error.envelope)
        .with_header("x-request-id", ctx.id.as_str())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("application panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("application panicked: {message}")
    } else {
        "application panicked".to_string()
    }
}
