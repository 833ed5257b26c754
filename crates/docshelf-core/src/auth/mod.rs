//! Session lifecycle: credential persistence, token renewal, and the
//! state machine the UI layer reads.
//!
//! This module provides:
//! - `CredentialStore`: namespaced persistence for the bearer pair and profile
//! - `ExpirationInfo`: expiry state decoded from the access token
//! - `EventBus`: synchronous session-level signals
//! - `RefreshScheduler`: background token renewal with overlap and
//!   stale-result guards
//! - `SessionManager`: the `Anonymous`/`Authenticated` state machine
//!
//! Components take their collaborators as constructor parameters, so tests
//! can substitute fakes for the transport, the clock, and navigation.

pub mod events;
pub mod refresh;
pub mod session;
pub mod store;
pub mod token;

pub use events::{EventBus, ListenerId, SessionEvent, SessionEventKind};
pub use refresh::{Clock, RefreshScheduler, RefreshTiming, RefreshedTokens, SystemClock, TokenRefresher};
pub use session::{Navigator, SessionManager, SessionState, SessionStatus};
pub use store::{Credential, CredentialStore};
pub use token::{ExpirationInfo, token_expiry};
