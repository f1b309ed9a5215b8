//! Assembles the full application router.

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::health;
use crate::metrics::{metrics_handler, MetricsConfig};
use crate::middleware::{request_context, MetricsLayer};
use crate::state::AppState;

/// Build the application with every route, the not-found fallback, and the
/// standard middleware stack.
///
/// The `/metrics` route is mounted only when `metrics` is enabled.
pub fn build_router(state: AppState, metrics: &MetricsConfig) -> Router {
    let api = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/profile", get(handlers::profile))
        .route(
            "/todos",
            get(handlers::list_todos).post(handlers::create_todo),
        )
        .route(
            "/todos/{id}",
            get(handlers::get_todo)
                .put(handlers::update_todo)
                .delete(handlers::delete_todo),
        );

    let mut app = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/health-checks", get(health::health_checks))
        .route("/favicon.ico", get(health::favicon))
        .route("/favicon.png", get(health::favicon))
        .nest("/api", api);

    if metrics.enabled {
        app = app.route(&metrics.path, get(metrics_handler));
    }

    app.fallback(health::not_found)
        .layer(MetricsLayer)
        .layer(from_fn(request_context))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
