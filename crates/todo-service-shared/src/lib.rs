//! HTTP application for the todo API.
//!
//! This crate is the embedded application the deployment shells run:
//!
//! - [`build_router`]: axum router with every route and the middleware stack
//! - [`AppState`]: configuration, accounts, and the process-wide connection guard
//! - [`ApiError`]: JSON error envelope used by the application and the shim
//! - [`health`]: health, root, favicon, and not-found handlers
//! - [`metrics`]: Prometheus metrics infrastructure
//! - [`logging`]: Structured JSON logging setup
//! - [`middleware`]: Request id propagation and HTTP metrics
//! - Request types with validation for each endpoint
//!
//! # Architecture
//!
//! Handlers are thin; all behaviour resides in `todo-lib`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  axum Handler                                               │
//! │  - Decode and validate the JSON body                        │
//! │  - Resolve the bearer token (protected routes)              │
//! │  - Call one todo-lib operation                              │
//! │  - Format the response or the error envelope                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides a ready router over an in-memory store.
//! Enable the `test-utils` feature to access it from dependent crates.

#![deny(warnings)]

mod auth;
pub mod config;
mod handlers;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod problem;
mod request;
mod response;
mod router;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use auth::AuthUser;
pub use config::{AppConfig, ConfigError};
pub use health::{endpoint_catalog, HealthStatus, ServiceInfo};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, metrics_handler, record_auth_event, record_connect_attempt,
    record_response_commit, record_todo_operation, MetricsConfig, MetricsError,
};
pub use middleware::{extract_or_generate_request_id, MetricsLayer, RequestId, REQUEST_ID_HEADER};
pub use problem::{from_lib_error, ApiError, ErrorEnvelope, FieldErrorBody};
pub use request::{
    CreateTodoRequest, LoginRequest, RegisterRequest, UpdateTodoRequest, ValidJson, Validate,
};
pub use response::{AuthResponse, MessageResponse, ProfileResponse};
pub use router::build_router;
pub use state::AppState;
