//! Background access-token renewal.
//!
//! A single tokio task sleeps until shortly before the stored access
//! token expires, renews it through the `TokenRefresher` transport, and
//! reschedules from the new expiry. Renewal failure is terminal for the
//! session: the store is cleared, `TokenExpired` goes out on the bus, and
//! nothing is rescheduled - the session state machine owns the reaction.
//!
//! Two guards keep the timing logic honest:
//! - `refreshing` ensures at most one renewal request is ever in flight,
//!   even when a manual `refresh_now` overlaps the scheduled one.
//! - a generation counter, bumped by `start`/`stop`, lets a renewal that
//!   completes after `stop()` be discarded instead of resurrecting the
//!   session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::{EventBus, SessionEventKind};
use super::store::{Credential, CredentialStore};
use super::token::ExpirationInfo;

/// Re-check cadence while no credential is stored. A refresh is never
/// attempted without a refresh token; we just wait for a login.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum sleep between expiry checks, so a token already inside the
/// safety margin cannot produce a zero or negative delay.
const DEFAULT_FLOOR_INTERVAL: Duration = Duration::from_secs(60);

/// Renewal headroom before the recorded expiry. Five minutes absorbs slow
/// responses and modest clock skew against the issuing server.
const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Token pair returned by the refresh endpoint. A missing refresh token
/// means the server kept the existing one valid.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Transport that exchanges a refresh token for a new pair. Production
/// uses `ApiClient`; tests inject fakes.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;
}

/// Time source for expiry math, injectable so tests can drive a virtual
/// clock in step with tokio's paused timers.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshTiming {
    pub safety_margin: Duration,
    pub floor_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for RefreshTiming {
    fn default() -> Self {
        Self {
            safety_margin: DEFAULT_SAFETY_MARGIN,
            floor_interval: DEFAULT_FLOOR_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    /// A new pair was written; scheduling continues.
    Refreshed,
    /// Another attempt is already in flight; nothing was done.
    InFlight,
    /// The session is over; nothing further is scheduled.
    SessionEnded,
    /// The scheduler was stopped while the request was in flight; the
    /// result was discarded.
    Stale,
}

pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<CredentialStore>,
    events: Arc<EventBus>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    timing: RefreshTiming,
    refreshing: AtomicBool,
    generation: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight flag on every exit path from `perform_refresh`,
/// including cancellation, so a failed attempt never blocks the next one.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<CredentialStore>,
        events: Arc<EventBus>,
        refresher: Arc<dyn TokenRefresher>,
        timing: RefreshTiming,
    ) -> Self {
        Self::with_clock(store, events, refresher, timing, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<CredentialStore>,
        events: Arc<EventBus>,
        refresher: Arc<dyn TokenRefresher>,
        timing: RefreshTiming,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                events,
                refresher,
                clock,
                timing,
                refreshing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// Start (or restart) the background task, scheduling from current
    /// store state. Idempotent: a running task is cancelled and replaced.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut task = self.lock_task();
        if let Some(handle) = task.take() {
            handle.abort();
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move { inner.run(generation).await }));
        debug!(generation, "Refresh scheduler started");
    }

    /// Cancel the pending wake timer. An in-flight renewal is allowed to
    /// finish, but its result is discarded; the in-flight flag itself is
    /// left for the attempt to clear.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mut task = self.lock_task();
        if let Some(handle) = task.take() {
            handle.abort();
            debug!("Refresh scheduler stopped");
        }
    }

    /// Renew immediately, outside the normal schedule. A no-op when an
    /// attempt is already in flight.
    pub async fn refresh_now(&self) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.inner.perform_refresh(generation).await;
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    async fn run(&self, generation: u64) {
        loop {
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let margin = chrono::Duration::from_std(self.timing.safety_margin)
                .unwrap_or_else(|_| chrono::Duration::zero());
            let info = self
                .store
                .credential()
                .map(|c| ExpirationInfo::inspect_at(&c.access_token, margin, self.clock.now()));
            match info {
                None => {
                    // No credential to renew; re-check after a login may
                    // have happened.
                    tokio::time::sleep(self.timing.poll_interval).await;
                }
                Some(info) if info.is_expired || info.will_expire_soon => {
                    match self.perform_refresh(generation).await {
                        RefreshOutcome::Refreshed => {}
                        RefreshOutcome::InFlight => {
                            tokio::time::sleep(self.timing.floor_interval).await;
                        }
                        RefreshOutcome::SessionEnded | RefreshOutcome::Stale => return,
                    }
                }
                Some(info) => {
                    let remaining = info.time_until_expiration.to_std().unwrap_or_default();
                    let delay = remaining
                        .saturating_sub(self.timing.safety_margin)
                        .max(self.timing.floor_interval);
                    debug!(delay_secs = delay.as_secs(), "Next expiry check scheduled");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn perform_refresh(&self, generation: u64) -> RefreshOutcome {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Refresh already in flight; skipping");
            return RefreshOutcome::InFlight;
        }
        let _guard = InFlightGuard(&self.refreshing);

        let Some(credential) = self.store.credential() else {
            warn!("No refresh token available; ending session");
            self.events.emit(
                SessionEventKind::TokenExpired,
                Some("no refresh token available".to_string()),
            );
            return RefreshOutcome::SessionEnded;
        };

        let result = self.refresher.refresh(&credential.refresh_token).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Scheduler stopped during refresh; discarding result");
            return RefreshOutcome::Stale;
        }

        match result {
            Ok(tokens) => {
                let refreshed = Credential {
                    access_token: tokens.access_token,
                    // The endpoint may rotate the refresh token; keep the
                    // existing one when it does not.
                    refresh_token: tokens
                        .refresh_token
                        .unwrap_or(credential.refresh_token),
                };
                let Some(profile) = self.store.profile() else {
                    warn!("Profile missing during token refresh; ending session");
                    self.end_session("stored session is incomplete");
                    return RefreshOutcome::SessionEnded;
                };
                if let Err(e) = self.store.set_all(&refreshed, &profile) {
                    warn!(error = %e, "Failed to persist refreshed tokens; ending session");
                    self.end_session("failed to persist refreshed tokens");
                    return RefreshOutcome::SessionEnded;
                }
                info!("Access token refreshed");
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; ending session");
                self.end_session(&format!("token refresh failed: {e}"));
                RefreshOutcome::SessionEnded
            }
        }
    }

    fn end_session(&self, message: &str) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store");
        }
        self.events
            .emit(SessionEventKind::TokenExpired, Some(message.to_string()));
    }
}
