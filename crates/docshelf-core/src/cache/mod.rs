//! Workspace-scoped caching.
//!
//! This module provides the `WorkspaceCache` coordinator: a keyed cache of
//! previously fetched workspace data plus the live view projection shown
//! to the UI. Switching workspaces drops entries scoped to the workspace
//! being left and reuses entries for the incoming one, so a revisit never
//! flashes a loading state while stale data never leaks across
//! workspaces.

pub mod coordinator;

pub use coordinator::{CacheKey, CachedData, DataKind, WorkspaceCache, WorkspacePayload, WorkspaceView};
