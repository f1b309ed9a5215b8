//! AWS Lambda function serving the todo API.
//!
//! Every gateway event is handed to the shared [`Shim`](todo_lambda_shared::Shim),
//! which answers health checks directly and forwards everything else to the
//! same router the standalone server uses.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lambda_runtime::{service_fn, Context, Error, LambdaEvent};
use serde_json::Value;
use tracing::{error, warn};

use todo_lambda_shared::{
    get_runtime, init_error_response, init_runtime, init_tracing, invalid_event_response,
    GatewayEvent, GatewayResponse,
};

/// Entry point used by the Lambda runtime.
pub async fn run() -> Result<(), Error> {
    init_tracing();

    // Build the shared state before the first event; nothing connects yet.
    if let Err(e) = init_runtime() {
        warn!(error = %e, "runtime unavailable; invocations will return 500");
    }

    lambda_runtime::run(service_fn(handler)).await
}

/// Lambda handler invoked per request.
pub async fn handler(event: LambdaEvent<Value>) -> Result<GatewayResponse, Error> {
    let (payload, context) = event.into_parts();
    let request_id = context.request_id.clone();

    let gateway_event: GatewayEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            error!(request_id = %request_id, error = %e, "failed to parse gateway event");
            return Ok(invalid_event_response(&e, &request_id));
        }
    };

    let runtime = match get_runtime() {
        Some(runtime) => runtime,
        None => match init_runtime() {
            Ok(runtime) => runtime,
            Err(e) => return Ok(init_error_response(&e, &request_id)),
        },
    };

    let response = runtime
        .shim()
        .handle(gateway_event, &request_id, platform_remaining(&context))
        .await;
    Ok(response)
}

/// Time left before the platform kills the invocation, if it told us.
fn platform_remaining(context: &Context) -> Option<Duration> {
    if context.deadline == 0 {
        return None;
    }
    let deadline = UNIX_EPOCH + Duration::from_millis(context.deadline);
    Some(
        deadline
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}
