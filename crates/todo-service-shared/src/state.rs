//! Application state shared by every handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use todo_lib::{
    Accounts, ConnectionGuard, Connector, PasswordHasher, SqliteConnector, StoreHandle,
    TokenService,
};

use crate::config::AppConfig;
use crate::metrics::MeteredConnector;
use crate::problem::{from_lib_error, ApiError};

/// Shared application state for all axum handlers.
///
/// Cheap to clone; clones share the same connection guard.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    guard: ConnectionGuard,
    accounts: Accounts,
    started_at: Instant,
}

impl AppState {
    /// Build state around the SQLite store named by the configuration.
    ///
    /// Nothing is opened here; the first call to [`AppState::store`] (or an
    /// explicit `guard().ensure()`) connects.
    pub fn from_config(config: AppConfig) -> Self {
        let connector = SqliteConnector::new(config.database_url());
        Self::with_connector(config, connector)
    }

    /// Build state with an arbitrary store connector.
    pub fn with_connector(config: AppConfig, connector: impl Connector) -> Self {
        let guard = ConnectionGuard::new(MeteredConnector::new(connector));
        Self::with_guard(config, guard)
    }

    /// Build state around an existing guard.
    pub fn with_guard(config: AppConfig, guard: ConnectionGuard) -> Self {
        let accounts = Accounts::new(
            PasswordHasher::new(config.bcrypt_cost),
            TokenService::new(config.jwt_secret.as_deref(), config.token_ttl),
        );
        Self {
            inner: Arc::new(AppStateInner {
                config,
                guard,
                accounts,
                started_at: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn guard(&self) -> &ConnectionGuard {
        &self.inner.guard
    }

    pub fn accounts(&self) -> &Accounts {
        &self.inner.accounts
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    /// Connected store handle, connecting first if needed.
    ///
    /// Returns immediately when the guard is already connected.
    pub async fn store(&self) -> Result<StoreHandle, ApiError> {
        self.inner
            .guard
            .ensure()
            .await
            .map_err(|err| from_lib_error(&todo_lib::Error::from(err)))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("environment", &self.inner.config.environment)
            .field("guard", &self.inner.guard)
            .field("tokens", self.inner.accounts.tokens())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use todo_lib::test_utils::ScriptedConnector;
    use todo_lib::ConnectionState;

    #[tokio::test]
    async fn test_store_connects_lazily() {
        let state = AppState::with_connector(AppConfig::default(), ScriptedConnector::succeeding());
        assert_eq!(state.guard().state(), ConnectionState::Disconnected);

        state.store().await.unwrap();
        assert_eq!(state.guard().state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_503() {
        let state = AppState::with_connector(
            AppConfig::default(),
            ScriptedConnector::failing("connection refused"),
        );
        let err = state.store().await.err().expect("expected error");
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.envelope.message.contains("connection refused"));
    }

    #[test]
    fn test_app_state_debug_hides_secret() {
        let config = AppConfig::default().with_jwt_secret("very-secret");
        let state = AppState::with_connector(config, ScriptedConnector::succeeding());
        let debug = format!("{state:?}");
        assert!(debug.contains("AppState"));
        assert!(!debug.contains("very-secret"));
    }
}
