//! In-memory session state machine.
//!
//! `SessionManager` keeps the reactive `Anonymous`/`Authenticated` state
//! the UI layer reads, synchronized with the credential store: every
//! mutator updates both together, so the two never diverge for more than
//! one synchronous tick. Login and logout drive the refresh scheduler,
//! and any signal on the bus ends the session through the forced path.

use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;
use tracing::{debug, info, warn};

use super::events::{EventBus, ListenerId, SessionEvent};
use super::refresh::RefreshScheduler;
use super::store::{Credential, CredentialStore};
use crate::models::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    pub profile: Option<Profile>,
}

impl SessionState {
    fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            profile: None,
        }
    }
}

/// Navigation collaborator. The core never renders routes itself; it only
/// tells the host where the user should land after each transition.
pub trait Navigator: Send + Sync {
    /// A successful login.
    fn after_login(&self);
    /// A user-initiated logout; lands on the public page.
    fn after_logout(&self);
    /// Forced expiration; lands on the re-authentication screen. Kept
    /// distinct from `after_logout` even though both end in `Anonymous`.
    fn after_session_expired(&self);
}

pub struct SessionManager {
    store: Arc<CredentialStore>,
    events: Arc<EventBus>,
    scheduler: RefreshScheduler,
    navigator: Arc<dyn Navigator>,
    state: Mutex<SessionState>,
    listener: Mutex<Option<ListenerId>>,
}

impl SessionManager {
    /// Build the manager and hook it into the signal bus. The listener
    /// holds a weak reference, so dropping the manager detaches it.
    pub fn new(
        store: Arc<CredentialStore>,
        events: Arc<EventBus>,
        scheduler: RefreshScheduler,
        navigator: Arc<dyn Navigator>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SessionManager>| {
            let weak = weak.clone();
            let listener = events.subscribe(move |event| {
                if let Some(manager) = weak.upgrade() {
                    manager.handle_signal(event);
                }
            });
            SessionManager {
                store,
                events: Arc::clone(&events),
                scheduler,
                navigator,
                state: Mutex::new(SessionState::anonymous()),
                listener: Mutex::new(Some(listener)),
            }
        })
    }

    /// Restore session state from the credential store. Call once at
    /// process start, from within a tokio runtime.
    pub fn initialize(&self) {
        if self.store.is_authenticated() {
            let profile = self.store.profile();
            self.set_state(SessionStatus::Authenticated, profile);
            self.scheduler.start();
            info!("Session restored from stored credentials");
        } else {
            let (credential, profile) = self.store.get();
            if credential.is_some() || profile.is_some() {
                debug!("Clearing stale partial session data");
            }
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear stale session data");
            }
            self.set_state(SessionStatus::Anonymous, None);
        }
    }

    /// Persist the credentials, mark the session authenticated, and start
    /// background renewal.
    pub fn login(&self, credential: Credential, profile: Profile) -> Result<()> {
        self.store.set_all(&credential, &profile)?;
        info!(user = %profile.id, "Logged in");
        self.set_state(SessionStatus::Authenticated, Some(profile));
        self.scheduler.start();
        self.navigator.after_login();
        Ok(())
    }

    /// User-initiated logout.
    pub fn logout(&self) {
        self.scheduler.stop();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store on logout");
        }
        self.set_state(SessionStatus::Anonymous, None);
        info!("Logged out");
        self.navigator.after_logout();
    }

    /// Update the stored and in-memory profile. The session status and
    /// the credential pair are not touched.
    pub fn update_profile(&self, profile: Profile) -> Result<()> {
        self.store.set_profile(&profile)?;
        self.lock_state().profile = Some(profile);
        Ok(())
    }

    /// Full teardown: detach from the bus and cancel background renewal.
    pub fn shutdown(&self) {
        let id = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(id) = id {
            self.events.unsubscribe(id);
        }
        self.scheduler.stop();
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_state().status == SessionStatus::Authenticated
    }

    pub fn profile(&self) -> Option<Profile> {
        self.lock_state().profile.clone()
    }

    fn handle_signal(&self, event: &SessionEvent) {
        {
            let state = self.lock_state();
            if state.status == SessionStatus::Anonymous {
                debug!(kind = ?event.kind, "Session signal while anonymous; ignoring");
                return;
            }
        }
        warn!(
            kind = ?event.kind,
            message = event.message.as_deref().unwrap_or(""),
            "Session ended by signal"
        );
        self.scheduler.stop();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store on forced expiration");
        }
        self.set_state(SessionStatus::Anonymous, None);
        self.navigator.after_session_expired();
    }

    fn set_state(&self, status: SessionStatus, profile: Option<Profile>) {
        *self.lock_state() = SessionState { status, profile };
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
