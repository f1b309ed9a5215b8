//! Wall-clock budgets for the connect and request phases.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use todo_service_shared::ApiError;

use crate::context::RequestContext;
use crate::event::GatewayResponse;
use crate::gate::{CommitResult, CommitSource, ResponseGate, ResponseOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {}ms exceeded", .budget.as_millis())]
pub struct DeadlineExceeded {
    pub budget: Duration,
}

/// A fixed budget applied either to a future or to a whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineGuard {
    budget: Duration,
}

impl DeadlineGuard {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run `work` to completion or until the budget elapses, whichever is first.
    ///
    /// On expiry `work` is dropped here; anything it spawned keeps running.
    /// Nothing is written anywhere: the caller decides how to respond.
    pub async fn race<F: Future>(&self, work: F) -> Result<F::Output, DeadlineExceeded> {
        tokio::time::timeout(self.budget, work)
            .await
            .map_err(|_| DeadlineExceeded {
                budget: self.budget,
            })
    }

    /// Sleep until `budget` after the request was received, then commit a
    /// 504 unless something else already has.
    ///
    /// Dropping the returned future cancels the timer without writing.
    pub async fn watch(&self, gate: &ResponseGate, ctx: &RequestContext) -> CommitResult {
        tokio::time::sleep_until(ctx.received_at + self.budget).await;

        if !gate.is_committed() {
            warn!(
                request_id = %ctx.id,
                method = %ctx.method,
                path = %ctx.path,
                budget_ms = u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX),
                "request deadline exceeded"
            );
        }
        gate.commit(
            CommitSource::Deadline,
            ResponseOutcome::Timeout(timeout_response(ctx, self.budget)),
        )
    }
}

/// 504 envelope for a request that outlived its budget.
pub fn timeout_response(ctx: &RequestContext, budget: Duration) -> GatewayResponse {
    let error = ApiError::gateway_timeout(format!(
        "Request did not complete within {}ms",
        budget.as_millis()
    ))
    .with_request(ctx.method.as_str(), ctx.path.as_str(), ctx.id.as_str());
    GatewayResponse::json(error.status.as_u16(), &error.envelope)
        .with_header("x-request-id", ctx.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GatewayEvent;

    fn context(budget: Duration) -> RequestContext {
        let event: GatewayEvent =
            serde_json::from_value(serde_json::json!({"rawPath": "/api/todos"})).unwrap();
        RequestContext::from_event(&event, "req-1", budget).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_returns_work_output() {
        let guard = DeadlineGuard::new(Duration::from_secs(5));
        let out = guard
            .race(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                7
            })
            .await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_times_out() {
        let guard = DeadlineGuard::new(Duration::from_secs(5));
        let out = guard.race(futures::future::pending::<()>()).await;
        assert_eq!(
            out,
            Err(DeadlineExceeded {
                budget: Duration::from_secs(5)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_commits_timeout_once() {
        let ctx = context(Duration::from_secs(10));
        let gate = ResponseGate::new(ctx.id.clone());
        let guard = DeadlineGuard::new(Duration::from_secs(10));

        let result = guard.watch(&gate, &ctx).await;
        assert_eq!(result, CommitResult::Committed);

        let outcome = gate.completed().await;
        assert_eq!(outcome.status(), 504);
        let body = outcome.response().json_body().unwrap();
        assert_eq!(body["error"], "Request timeout");
        assert_eq!(body["path"], "/api/todos");
        assert_eq!(body["requestId"], "req-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_is_noop_after_commit() {
        let ctx = context(Duration::from_secs(10));
        let gate = ResponseGate::new(ctx.id.clone());
        gate.commit(
            CommitSource::Application,
            ResponseOutcome::Success(GatewayResponse::empty(200)),
        );

        let result = DeadlineGuard::new(Duration::from_secs(10))
            .watch(&gate, &ctx)
            .await;
        assert_eq!(
            result,
            CommitResult::AlreadyCommitted {
                winner: CommitSource::Application
            }
        );
        assert_eq!(gate.completed().await.status(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_watch_writes_nothing() {
        let ctx = context(Duration::from_secs(10));
        let gate = ResponseGate::new(ctx.id.clone());
        let guard = DeadlineGuard::new(Duration::from_secs(10));

        let watch = guard.watch(&gate, &ctx);
        let _ = tokio::time::timeout(Duration::from_secs(1), watch).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!gate.is_committed());
    }
}
