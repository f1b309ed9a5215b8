//! Test utilities for handler and router testing.
//!
//! States built here use an in-memory store behind a scripted connector and
//! the cheapest bcrypt cost, so tests run fast without touching disk.

use std::time::Duration;

use axum::Router;
use todo_lib::test_utils::ScriptedConnector;
use todo_lib::Connector;

use crate::config::AppConfig;
use crate::metrics::MetricsConfig;
use crate::router::build_router;
use crate::state::AppState;

/// Signing secret used by [`test_config`].
pub const TEST_JWT_SECRET: &str = "test-secret";

/// Fully populated configuration with fast hashing.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default()
        .with_database_url("sqlite::memory:")
        .with_jwt_secret(TEST_JWT_SECRET)
        .with_timeouts(Duration::from_secs(10), Duration::from_secs(5));
    config.bcrypt_cost = 4;
    config.environment = "test".to_string();
    config
}

/// State over a fresh in-memory store, not yet connected.
pub fn test_state() -> AppState {
    test_state_with(ScriptedConnector::succeeding())
}

/// State over an arbitrary connector.
pub fn test_state_with(connector: impl Connector) -> AppState {
    AppState::with_connector(test_config(), connector)
}

/// Router with metrics disabled.
pub fn test_router(state: AppState) -> Router {
    let metrics = MetricsConfig {
        enabled: false,
        ..MetricsConfig::default()
    };
    build_router(state, &metrics)
}

/// Generate a unique request ID for testing.
pub fn test_request_id() -> String {
    format!("test-{}", uuid::Uuid::now_v7())
}
