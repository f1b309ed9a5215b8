//! Tracing initialization for the Lambda function.
//!
//! JSON lines with flattened event fields for CloudWatch Logs. `LOG_FORMAT=text`
//! switches to human-readable output for local emulators.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use todo_service_shared::LogFormat;

/// Install the global subscriber.
///
/// Call once at the start of `main`, before `lambda_runtime::run()`. The level
/// follows `RUST_LOG` and defaults to `info`. Returns `false` if a subscriber
/// was already installed.
///
/// ```no_run
/// use todo_lambda_shared::init_tracing;
///
/// #[tokio::main]
/// async fn main() -> Result<(), lambda_runtime::Error> {
///     init_tracing();
///     // ... rest of Lambda setup
///     Ok(())
/// }
/// ```
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("LOG_FORMAT")
        .map(|v| LogFormat::parse(&v))
        .unwrap_or_default();

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_ansi(false).without_time())
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .flatten_event(true),
            )
            .try_init(),
    };
    installed.is_ok()
}
