//! Todo API HTTP server.
//!
//! Long-running deployment of the todo application: connects to the document
//! store once at start-up, then serves every route from one process.
//!
//! # Endpoints
//!
//! - `POST /api/auth/register`, `POST /api/auth/login`, `GET /api/auth/profile`
//! - `GET|POST /api/todos`, `GET|PUT|DELETE /api/todos/{id}`
//! - `GET /health`, `GET /health-checks`, `GET /`
//! - `GET /metrics` - Prometheus metrics endpoint
//!
//! # Configuration
//!
//! - `DATABASE_URL` - SQLite store location (default: in-memory)
//! - `JWT_SECRET` - token signing secret (required for auth routes)
//! - `JWT_EXPIRES_IN` - token lifetime (default: 7d)
//! - `CONNECT_TIMEOUT_MS` - start-up connect budget (default: 5000)
//! - `RUST_LOG` - Log level (default: info)
//! - `LOG_FORMAT` - Log format: json (default) or text
//! - `SERVICE_PORT` - HTTP port (default: 3001)

use std::net::SocketAddr;

use tracing::{error, info, info_span, warn, Instrument};

use todo_service_shared::{
    build_router, init_logging, init_metrics, AppConfig, AppState, LoggingConfig, MetricsConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_config = LoggingConfig::from_env().with_service("todo-api");
    if let Err(e) = init_logging(&logging_config) {
        eprintln!("{e}");
    }

    let service = logging_config
        .service
        .clone()
        .unwrap_or_else(|| "todo-api".to_string());
    run().instrument(info_span!("service", service = %service)).await
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let metrics_config = MetricsConfig::from_env();
    if let Err(e) = init_metrics(&metrics_config) {
        // Metrics are optional.
        warn!(error = %e, "failed to initialize metrics, continuing without metrics");
    }

    let config = AppConfig::from_env().map_err(|e| {
        error!(error = %e, "invalid configuration");
        e
    })?;
    for var in config.missing_required() {
        warn!(variable = var, "required environment variable not set");
    }

    let port = config.port;
    let connect_timeout = config.connect_timeout;
    let state = AppState::from_config(config);
    let target = state.guard().target();

    info!(database = %target, port, environment = %state.config().environment, "starting todo service");

    match tokio::time::timeout(connect_timeout, state.guard().ensure()).await {
        Ok(Ok(_)) => info!(database = %target, "database connected"),
        Ok(Err(e)) => {
            error!(
                error = %e,
                hint = e.hint().unwrap_or("none"),
                database = %target,
                "database connection failed"
            );
            return Err(e.into());
        }
        Err(_) => {
            error!(
                timeout_ms = u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX),
                hint = "the database may be unreachable from this network",
                database = %target,
                "database connection timed out"
            );
            return Err("database connection timed out".into());
        }
    }

    let app = build_router(state, &metrics_config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "listening on");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
