//! Single-assignment arbiter for the terminal response of one request.
//!
//! Up to four sources race to answer an invocation: the application
//! completing, the application failing, the deadline expiring, and the shim
//! itself (short-circuit routes, connect failures). The first
//! [`ResponseGate::commit`] wins and is the only one that reaches the sink;
//! every later call is logged and ignored.
//!
//! The check-and-set is one `compare_exchange` on an atomic that records the
//! winning source, so losers learn who won without further synchronization.
//! Completion is observed with [`ResponseGate::completed`], never by
//! intercepting writes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tracing::{debug, info};

use todo_service_shared::record_response_commit;

use crate::event::GatewayResponse;

/// Who proposed an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommitSource {
    ShortCircuit = 1,
    Connection = 2,
    Application = 3,
    ApplicationError = 4,
    Deadline = 5,
    Shim = 6,
}

impl CommitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitSource::ShortCircuit => "short_circuit",
            CommitSource::Connection => "connection",
            CommitSource::Application => "application",
            CommitSource::ApplicationError => "application_error",
            CommitSource::Deadline => "deadline",
            CommitSource::Shim => "shim",
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CommitSource::ShortCircuit),
            2 => Some(CommitSource::Connection),
            3 => Some(CommitSource::Application),
            4 => Some(CommitSource::ApplicationError),
            5 => Some(CommitSource::Deadline),
            6 => Some(CommitSource::Shim),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(GatewayResponse),
    Failure(GatewayResponse),
    /// Always status 504.
    Timeout(GatewayResponse),
}

impl ResponseOutcome {
    pub fn status(&self) -> u16 {
        self.response().status_code
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResponseOutcome::Success(_) => "success",
            ResponseOutcome::Failure(_) => "failure",
            ResponseOutcome::Timeout(_) => "timeout",
        }
    }

    pub fn response(&self) -> &GatewayResponse {
        match self {
            ResponseOutcome::Success(r) | ResponseOutcome::Failure(r) | ResponseOutcome::Timeout(r) => r,
        }
    }

    pub fn into_response(self) -> GatewayResponse {
        match self {
            ResponseOutcome::Success(r) | ResponseOutcome::Failure(r) | ResponseOutcome::Timeout(r) => r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    Committed,
    AlreadyCommitted { winner: CommitSource },
}

impl CommitResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed)
    }
}

/// Destination of the winning response.
pub trait ResponseSink: Send + Sync + 'static {
    fn write(&self, response: &GatewayResponse);
}

const OPEN: u8 = 0;

pub struct ResponseGate {
    request_id: String,
    winner: AtomicU8,
    outcome: OnceLock<ResponseOutcome>,
    sink: Option<Arc<dyn ResponseSink>>,
    done: watch::Sender<bool>,
}

impl std::fmt::Debug for ResponseGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseGate")
            .field("request_id", &self.request_id)
            .field("winner", &self.winner())
            .finish()
    }
}

impl ResponseGate {
    /// Gate whose only sink is its own outcome slot, read via [`completed`](Self::completed).
    pub fn new(request_id: impl Into<String>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            request_id: request_id.into(),
            winner: AtomicU8::new(OPEN),
            outcome: OnceLock::new(),
            sink: None,
            done,
        }
    }

    /// Gate that also writes the winning response to `sink`.
    pub fn with_sink(request_id: impl Into<String>, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new(request_id)
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Propose `outcome`. Only the first call performs the write.
    pub fn commit(&self, source: CommitSource, outcome: ResponseOutcome) -> CommitResult {
        match self
            .winner
            .compare_exchange(OPEN, source as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                info!(
                    request_id = %self.request_id,
                    source = %source,
                    outcome = outcome.kind(),
                    status = outcome.status(),
                    "response committed"
                );
                record_response_commit(source.as_str(), "committed");

                if let Some(sink) = &self.sink {
                    sink.write(outcome.response());
                }
                // Only the winner reaches here, so the slot is empty.
                let _ = self.outcome.set(outcome);
                self.done.send_replace(true);
                CommitResult::Committed
            }
            Err(current) => {
                let winner = CommitSource::from_u8(current).unwrap_or(CommitSource::Shim);
                debug!(
                    request_id = %self.request_id,
                    source = %source,
                    winner = %winner,
                    outcome = outcome.kind(),
                    "response already committed; ignoring"
                );
                record_response_commit(source.as_str(), "ignored");
                CommitResult::AlreadyCommitted { winner }
            }
        }
    }

    pub fn is_committed(&self) -> bool {
        self.winner.load(Ordering::Acquire) != OPEN
    }

    pub fn winner(&self) -> Option<CommitSource> {
        CommitSource::from_u8(self.winner.load(Ordering::Acquire))
    }

    /// The committed outcome, if the winner has finished writing it.
    pub fn outcome(&self) -> Option<&ResponseOutcome> {
        self.outcome.get()
    }

    /// Wait for the winning outcome.
    pub async fn completed(&self) -> ResponseOutcome {
        let mut done = self.done.subscribe();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome.clone();
            }
            // The sender lives in `self`, so this only fails if the gate is dropped.
            if done.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}
