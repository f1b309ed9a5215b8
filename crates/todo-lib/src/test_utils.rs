//! Fixtures for exercising connection handling without a real database.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::connection::{ConnectionError, ConnectionGuard, Connector};
use crate::store::{MemoryStore, StoreHandle};

/// Connector whose outcomes follow a script and which counts every attempt.
///
/// Each successful attempt hands out the same [`MemoryStore`], so data written
/// through one connection is visible after a reconnect. Once the script is
/// exhausted the last outcome repeats.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
    error: String,
    delay: Option<Duration>,
    hang: bool,
    calls: Arc<AtomicUsize>,
    store: Arc<MemoryStore>,
}

impl ScriptedConnector {
    pub fn with_script(outcomes: impl IntoIterator<Item = bool>) -> Self {
        let script: VecDeque<bool> = outcomes.into_iter().collect();
        let last = script.back().copied().unwrap_or(true);
        Self {
            script: Mutex::new(script),
            last: Mutex::new(last),
            error: "connection refused".to_string(),
            delay: None,
            hang: false,
            calls: Arc::new(AtomicUsize::new(0)),
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_script([true])
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            ..Self::with_script([false])
        }
    }

    /// Attempts never resolve.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::succeeding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of started attempts.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    fn next_outcome(&self) -> bool {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = script.pop_front() {
            *last = next;
        }
        *last
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> BoxFuture<'static, Result<StoreHandle, ConnectionError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let succeed = self.next_outcome();
        let delay = self.delay;
        let hang = self.hang;
        let error = self.error.clone();
        let store: StoreHandle = self.store.clone();
        async move {
            if hang {
                futures::future::pending::<()>().await;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if succeed {
                Ok(store)
            } else {
                Err(ConnectionError::new(error))
            }
        }
        .boxed()
    }

    fn target(&self) -> String {
        "scripted://test".to_string()
    }
}

/// Guard over a fresh in-memory store that connects on first use.
pub fn memory_guard() -> ConnectionGuard {
    ConnectionGuard::new(ScriptedConnector::succeeding())
}

/// Guard that is already connected, with its backing store.
pub async fn connected_memory_guard() -> (ConnectionGuard, Arc<MemoryStore>) {
    let connector = ScriptedConnector::succeeding();
    let store = connector.store();
    let guard = ConnectionGuard::new(connector);
    if let Err(err) = guard.ensure().await {
        panic!("scripted connector failed: {err}");
    }
    (guard, store)
}
