//! Session-level signal bus.
//!
//! Synchronous pub/sub for the three session-ending signals. Delivery
//! happens in subscription order at the call to `emit`; a panicking
//! listener is isolated so the remaining listeners still see the event.
//! Purely in-memory, nothing survives a restart.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    /// The access token expired, or could no longer be renewed.
    TokenExpired,
    /// The server rejected a request with 401.
    Unauthorized,
    /// The server demanded the client end the session.
    LogoutRequired,
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Handle returned by `subscribe`, used to detach the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Detach a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.lock_listeners().retain(|(listener_id, _)| *listener_id != id);
    }

    /// Deliver an event to every listener, in subscription order.
    pub fn emit(&self, kind: SessionEventKind, message: Option<String>) {
        let event = SessionEvent {
            kind,
            message,
            timestamp: Utc::now(),
        };
        // Snapshot outside the lock so a listener may subscribe or
        // unsubscribe from inside its callback.
        let snapshot: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(kind = ?event.kind, "Session event listener panicked; continuing delivery");
            }
        }
    }

    /// Remove every listener. Full-teardown only; normal logout keeps
    /// subscriptions alive.
    pub fn clear(&self) {
        self.lock_listeners().clear();
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
