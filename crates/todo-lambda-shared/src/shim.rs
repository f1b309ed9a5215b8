//! Per-invocation orchestration.
//!
//! ```text
//! event ─▶ RequestContext ─▶ classify ─┬─ ShortCircuit ─────────────────────────▶ commit
//!                                      ├─ RequiresDatabase ─ race(ensure) ─┬─ err ▶ commit 503
//!                                      │                                   └─ ok ─┐
//!                                      └─ Stateless ─ background ensure ──────────┤
//!                                                                                 ▼
//!                                          spawn(Adapter::invoke) ║ DeadlineGuard::watch
//!                                                                 ▼
//!                                                     ResponseGate::completed()
//! ```
//!
//! Whatever happens, exactly one outcome is committed per invocation and it
//! is the one returned to the platform.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span, warn, Instrument};

use todo_service_shared::{from_lib_error, ApiError, AppState};

use crate::adapter::{Adapter, Application};
use crate::classifier::{classify, Classification};
use crate::context::RequestContext;
use crate::deadline::DeadlineGuard;
use crate::event::{GatewayEvent, GatewayResponse};
use crate::gate::{CommitSource, ResponseGate, ResponseOutcome, ResponseSink};

/// Left unused at the end of the platform's own budget so the shim, not the
/// platform, produces the timeout response.
pub const PLATFORM_SAFETY_MARGIN: Duration = Duration::from_millis(500);

/// Serves gateway events with the embedded application.
pub struct Shim<A> {
    state: AppState,
    adapter: Adapter<A>,
    sink: Option<Arc<dyn ResponseSink>>,
}

impl<A> std::fmt::Debug for Shim<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shim").field("state", &self.state).finish()
    }
}

impl<A: Application> Shim<A> {
    pub fn new(state: AppState, app: A) -> Self {
        Self {
            state,
            adapter: Adapter::new(app),
            sink: None,
        }
    }

    /// Also write every committed response to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Request budget: the configured timeout, shortened to fit the platform
    /// deadline when one is known.
    ///
    /// With less than the safety margin left, half of what remains is used so
    /// the deadline still fires before the platform gives up.
    pub fn request_budget(&self, platform_remaining: Option<Duration>) -> Duration {
        let configured = self.state.config().request_timeout;
        let Some(remaining) = platform_remaining else {
            return configured;
        };
        let available = remaining.saturating_sub(PLATFORM_SAFETY_MARGIN);
        if available.is_zero() {
            configured.min(remaining / 2)
        } else {
            configured.min(available)
        }
    }

    /// Serve one event. Always produces a response.
    pub async fn handle(
        &self,
        event: GatewayEvent,
        platform_request_id: &str,
        platform_remaining: Option<Duration>,
    ) -> GatewayResponse {
        let budget = self.request_budget(platform_remaining);

        let ctx = match RequestContext::from_event(&event, platform_request_id, budget) {
            Ok(ctx) => Arc::new(ctx),
            Err(err) => {
                warn!(request_id = %platform_request_id, error = %err, "rejecting malformed event");
                let error = ApiError::bad_request(err.to_string()).with_request(
                    event.method(),
                    event.path(),
                    platform_request_id,
                );
                return GatewayResponse::json(error.status.as_u16(), &error.envelope);
            }
        };

        let span = info_span!(
            "invocation",
            request_id = %ctx.id,
            method = %ctx.method,
            path = %ctx.path,
        );
        self.serve(ctx, budget).instrument(span).await
    }

    async fn serve(&self, ctx: Arc<RequestContext>, budget: Duration) -> GatewayResponse {
        let gate = Arc::new(match &self.sink {
            Some(sink) => ResponseGate::with_sink(ctx.id.clone(), Arc::clone(sink)),
            None => ResponseGate::new(ctx.id.clone()),
        });

        let classification = classify(&ctx.method, &ctx.path);
        info!(classification = classification.as_str(), "request classified");

        match classification {
            Classification::ShortCircuit(route) => {
                gate.commit(
                    CommitSource::ShortCircuit,
                    ResponseOutcome::Success(route.respond(self.state.uptime())),
                );
            }
            Classification::RequiresDatabase => {
                if self.connect(&ctx, &gate).await {
                    self.dispatch(&ctx, &gate, budget).await;
                }
            }
            Classification::Stateless => {
                self.state.guard().spawn_background_ensure();
                self.dispatch(&ctx, &gate, budget).await;
            }
        }

        let response = gate.completed().await.into_response();
        info!(
            status = response.status_code,
            winner = gate.winner().map(|w| w.as_str()).unwrap_or("none"),
            duration_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
            "invocation complete"
        );
        response.with_header("x-request-id", ctx.id.as_str())
    }

    /// Await the store within the connect budget. Commits a 503 and returns
    /// `false` when it is not available.
    async fn connect(&self, ctx: &RequestContext, gate: &ResponseGate) -> bool {
        let guard = self.state.guard();
        let budget = self
            .state
            .config()
            .connect_timeout
            .min(ctx.remaining());

        let error = match DeadlineGuard::new(budget).race(guard.ensure()).await {
            Ok(Ok(_)) => return true,
            Ok(Err(err)) => {
                warn!(
                    error = %err,
                    hint = err.hint().unwrap_or("none"),
                    database = %guard.target(),
                    "database unavailable"
                );
                from_lib_error(&todo_lib::Error::from(err))
            }
            Err(exceeded) => {
                // The attempt keeps running; a later request may find it connected.
                warn!(
                    error = %exceeded,
                    database = %guard.target(),
                    state = %guard.state(),
                    "database connect timed out"
                );
                ApiError::service_unavailable("Database connection timed out")
            }
        };

        let error = error.with_request(ctx.method.as_str(), ctx.path.as_str(), ctx.id.as_str());
        gate.commit(
            CommitSource::Connection,
            ResponseOutcome::Failure(GatewayResponse::json(
                error.status.as_u16(),
                &error.envelope,
            )),
        );
        false
    }

    /// Run the application and the request deadline concurrently until one
    /// of them commits.
    async fn dispatch(&self, ctx: &Arc<RequestContext>, gate: &Arc<ResponseGate>, budget: Duration) {
        let adapter = self.adapter.clone();
        let task_ctx = Arc::clone(ctx);
        let task_gate = Arc::clone(gate);
        // Detached: after a timeout the application may still finish its
        // work, but its commit is ignored.
        tokio::spawn(
            async move { adapter.invoke(&task_ctx, &task_gate).await }.in_current_span(),
        );

        let guard = DeadlineGuard::new(budget);
        let watch = guard.watch(gate, ctx);
        tokio::select! {
            _ = gate.completed() => {}
            _ = watch => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{api_event, gateway_event, AppBehavior, RecordingSink, ScriptedApp};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use todo_lib::test_utils::ScriptedConnector;
    use todo_service_shared::test_utils::{test_config, test_state_with};

    fn event(method: &str, path: &str) -> GatewayEvent {
        gateway_event(api_event(method, path))
    }

    fn shim(
        connector: ScriptedConnector,
        behavior: AppBehavior,
    ) -> (Shim<ScriptedApp>, Arc<AtomicUsize>, Arc<RecordingSink>) {
        let app = ScriptedApp::new(behavior);
        let calls = app.calls();
        let sink = Arc::new(RecordingSink::default());
        let shim = Shim::new(test_state_with(connector), app).with_sink(sink.clone());
        (shim, calls, sink)
    }

    #[tokio::test]
    async fn test_short_circuit_never_connects_or_dispatches() {
        let connector = ScriptedConnector::succeeding();
        let connects = connector.calls();
        let (shim, calls, sink) = shim(connector, AppBehavior::Respond(200));

        for (method, path, status) in [
            ("GET", "/health", 200),
            ("GET", "/", 200),
            ("GET", "/favicon.ico", 204),
            ("GET", "", 200),
        ] {
            let response = shim.handle(event(method, path), "req", None).await;
            assert_eq!(response.status_code, status, "{method} {path:?}");
        }

        assert_eq!(connects.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.statuses(), vec![200, 200, 204, 200]);
    }

    #[tokio::test]
    async fn test_api_route_connects_then_dispatches() {
        let connector = ScriptedConnector::succeeding();
        let connects = connector.calls();
        let (shim, calls, _) = shim(connector, AppBehavior::Respond(200));

        let first = shim.handle(event("GET", "/api/todos"), "req-1", None).await;
        let second = shim.handle(event("GET", "/api/todos"), "req-2", None).await;

        assert_eq!(first.status_code, 200);
        assert_eq!(second.status_code, 200);
        assert_eq!(first.header("x-request-id"), Some("req-1"));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_is_503_without_dispatch() {
        let (shim, calls, sink) = shim(
            ScriptedConnector::failing("connection refused"),
            AppBehavior::Respond(200),
        );

        let response = shim.handle(event("POST", "/api/auth/login"), "req", None).await;

        assert_eq!(response.status_code, 503);
        let body = response.json_body().unwrap();
        assert_eq!(body["error"], "Service unavailable");
        assert_eq!(body["path"], "/api/auth/login");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_is_503() {
        let (shim, calls, _) = shim(ScriptedConnector::hanging(), AppBehavior::Respond(200));

        let response = shim.handle(event("GET", "/api/todos"), "req", None).await;

        assert_eq!(response.status_code, 503);
        assert_eq!(
            response.json_body().unwrap()["message"],
            "Database connection timed out"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stateless_route_connects_in_background() {
        let connector = ScriptedConnector::failing("connection refused");
        let connects = connector.calls();
        let (shim, calls, _) = shim(connector, AppBehavior::Respond(200));

        let response = shim.handle(event("GET", "/health-checks"), "req", None).await;

        assert_eq!(response.status_code, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(shim.state().guard().state().as_str(), "failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_application_gets_one_504() {
        let (shim, _, sink) = shim(ScriptedConnector::succeeding(), AppBehavior::Hang);

        let response = shim.handle(event("GET", "/api/todos"), "req-9", None).await;

        assert_eq!(response.status_code, 504);
        let body = response.json_body().unwrap();
        assert_eq!(body["error"], "Request timeout");
        assert_eq!(body["requestId"], "req-9");

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(sink.statuses(), vec![504]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_application_response_is_discarded() {
        let timeout = test_config().request_timeout;
        let (shim, _, sink) = shim(
            ScriptedConnector::succeeding(),
            AppBehavior::Delayed(timeout * 2, 200),
        );

        let response = shim.handle(event("GET", "/api/todos"), "req", None).await;
        assert_eq!(response.status_code, 504);

        // Let the application finish; its commit must be ignored.
        tokio::time::sleep(timeout * 3).await;
        assert_eq!(sink.statuses(), vec![504]);
    }

    #[tokio::test]
    async fn test_application_error_is_500() {
        let (shim, _, sink) = shim(
            ScriptedConnector::succeeding(),
            AppBehavior::Fail("boom".to_string()),
        );

        let response = shim.handle(event("DELETE", "/api/todos/1"), "req", None).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.json_body().unwrap()["method"], "DELETE");
        assert_eq!(sink.statuses(), vec![500]);
    }

    #[tokio::test]
    async fn test_platform_deadline_shortens_budget() {
        let (shim, _, _) = shim(ScriptedConnector::succeeding(), AppBehavior::Respond(200));
        let configured = shim.state().config().request_timeout;

        assert_eq!(shim.request_budget(None), configured);
        assert_eq!(
            shim.request_budget(Some(Duration::from_secs(3))),
            Duration::from_millis(2500)
        );
        assert_eq!(shim.request_budget(Some(configured * 10)), configured);
    }

    #[tokio::test]
    async fn test_nearly_expired_invocation_stays_under_platform_deadline() {
        let (shim, _, _) = shim(ScriptedConnector::succeeding(), AppBehavior::Respond(200));

        for ms in [100, 400, 500] {
            let remaining = Duration::from_millis(ms);
            let budget = shim.request_budget(Some(remaining));
            assert!(budget < remaining, "{ms}ms left gave {budget:?}");
        }
        assert_eq!(shim.request_budget(Some(Duration::ZERO)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_platform_deadline_still_gets_guard_504() {
        let (shim, _, sink) = shim(ScriptedConnector::succeeding(), AppBehavior::Hang);
        let remaining = Duration::from_millis(400);
        let started = tokio::time::Instant::now();

        let response = shim
            .handle(event("GET", "/api/todos"), "req", Some(remaining))
            .await;

        assert_eq!(response.status_code, 504);
        assert!(started.elapsed() < remaining);
        assert_eq!(sink.statuses(), vec![504]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_application_finishing_at_deadline_commits_once() {
        let budget = test_config().request_timeout;
        let (shim, _, sink) = shim(
            ScriptedConnector::succeeding(),
            AppBehavior::Delayed(budget, 200),
        );

        let response = shim.handle(event("GET", "/api/todos"), "req", None).await;

        // Either side may win the tie; the loser must not write.
        tokio::time::sleep(budget).await;
        let statuses = sink.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0], response.status_code);
        assert!([200, 504].contains(&response.status_code));
    }

    #[tokio::test]
    async fn test_bad_base64_body_is_400() {
        let (shim, _, _) = shim(ScriptedConnector::succeeding(), AppBehavior::Respond(200));
        let event = gateway_event(json!({
            "httpMethod": "POST",
            "path": "/api/todos",
            "body": "***",
            "isBase64Encoded": true
        }));

        let response = shim.handle(event, "req", None).await;
        assert_eq!(response.status_code, 400);
    }
}
