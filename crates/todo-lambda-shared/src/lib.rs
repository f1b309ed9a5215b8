//! Runs the todo application inside AWS Lambda.
//!
//! Each invocation flows through a fixed pipeline:
//!
//! - [`RequestContext`]: normalized view of the gateway event (v1 or v2 payload)
//! - [`classify`]: decides whether the request needs the database at all
//! - [`DeadlineGuard`]: bounds the connect phase and the whole request
//! - [`Adapter`]: hands the request to the embedded [`Application`]
//! - [`ResponseGate`]: accepts exactly one response per invocation
//!
//! [`Shim`] ties these together; [`LambdaRuntime`] keeps one per process so
//! the database connection survives warm invocations.
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides event builders, scripted applications,
//! and a recording sink. Enable the `test-utils` feature to access it from
//! dependent crates.

#![deny(warnings)]

mod adapter;
mod classifier;
mod context;
mod deadline;
mod event;
mod gate;
mod runtime;
mod shim;
mod tracing_init;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapter::{failure_response, Adapter, AdapterOutcome, Application, ApplicationError};
pub use classifier::{classify, Classification, ShortCircuit};
pub use context::RequestContext;
pub use deadline::{timeout_response, DeadlineExceeded, DeadlineGuard};
pub use event::{
    is_binary_content_type, EventError, GatewayEvent, GatewayHttp, GatewayRequestContext,
    GatewayResponse,
};
pub use gate::{CommitResult, CommitSource, ResponseGate, ResponseOutcome, ResponseSink};
pub use runtime::{
    get_runtime, init_error_response, init_runtime, init_runtime_with, invalid_event_response,
    InitError, LambdaRuntime,
};
pub use shim::{Shim, PLATFORM_SAFETY_MARGIN};
pub use tracing_init::init_tracing;
