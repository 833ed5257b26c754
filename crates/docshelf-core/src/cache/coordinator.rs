//! Workspace cache coordination.
//!
//! Tracks the currently active workspace and a keyed cache of everything
//! fetched for it. On a switch, entries scoped exclusively to the
//! workspace being left are dropped immediately; entries for the incoming
//! workspace are applied to the live view before any fetch happens.
//! Closing the view keeps the cache, so returning to the same workspace
//! is instant.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{DocumentSummary, WorkspaceId, WorkspaceSnapshot};

/// Consider cached workspace data stale after 15 minutes. Documents move
/// through the OCR pipeline on the order of minutes, so anything older
/// should be refetched on next use.
const CACHE_STALE_MINUTES: i64 = 15;

/// A cached payload together with when it was fetched.
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// Kind of workspace-scoped payload an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Snapshot,
    Documents,
}

/// Structured cache tag: the payload kind plus the workspace that owns
/// it. Purge decisions compare ids exactly, never by string matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: DataKind,
    pub workspace: WorkspaceId,
}

#[derive(Debug, Clone)]
pub enum WorkspacePayload {
    Snapshot(WorkspaceSnapshot),
    Documents(Vec<DocumentSummary>),
}

impl WorkspacePayload {
    pub fn kind(&self) -> DataKind {
        match self {
            WorkspacePayload::Snapshot(_) => DataKind::Snapshot,
            WorkspacePayload::Documents(_) => DataKind::Documents,
        }
    }
}

/// Live projection of the active workspace, as shown to the UI layer.
/// `loading` and `error` are transient; the rest mirrors cache state.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceView {
    pub snapshot: Option<WorkspaceSnapshot>,
    pub documents: Vec<DocumentSummary>,
    pub loading: bool,
    pub error: Option<String>,
}

impl WorkspaceView {
    fn clear_workspace_data(&mut self) {
        self.snapshot = None;
        self.documents.clear();
    }
}

#[derive(Default)]
pub struct WorkspaceCache {
    current: Option<WorkspaceId>,
    entries: HashMap<CacheKey, CachedData<WorkspacePayload>>,
    pub view: WorkspaceView,
}

impl WorkspaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&WorkspaceId> {
        self.current.as_ref()
    }

    /// Make `new_id` the active workspace.
    ///
    /// On first load, a cache hit populates the view immediately and
    /// nothing is purged. On a real switch, the view's workspace data is
    /// cleared, hits for the incoming workspace are applied, and entries
    /// scoped exclusively to the workspace being left are dropped. An
    /// entry tagged with the active workspace is never purged here.
    pub fn enter(&mut self, new_id: WorkspaceId) {
        match self.current.clone() {
            None => {
                self.apply_cached(&new_id);
            }
            Some(ref old) if *old == new_id => {
                self.apply_cached(&new_id);
            }
            Some(old) => {
                self.view.clear_workspace_data();
                self.apply_cached(&new_id);
                let before = self.entries.len();
                self.entries.retain(|key, _| key.workspace != old);
                debug!(
                    left = %old,
                    entered = %new_id,
                    purged = before - self.entries.len(),
                    "Workspace switch"
                );
            }
        }
        self.current = Some(new_id);
    }

    fn apply_cached(&mut self, id: &WorkspaceId) {
        let snapshot_key = CacheKey {
            kind: DataKind::Snapshot,
            workspace: id.clone(),
        };
        if let Some(entry) = self.entries.get(&snapshot_key) {
            if let WorkspacePayload::Snapshot(snapshot) = &entry.data {
                self.view.snapshot = Some(snapshot.clone());
            }
        }
        let documents_key = CacheKey {
            kind: DataKind::Documents,
            workspace: id.clone(),
        };
        if let Some(entry) = self.entries.get(&documents_key) {
            if let WorkspacePayload::Documents(documents) = &entry.data {
                self.view.documents = documents.clone();
            }
        }
    }

    /// Store freshly fetched data. Data for the active workspace is also
    /// applied to the live view, ending any load in progress.
    pub fn insert(&mut self, workspace: WorkspaceId, payload: WorkspacePayload) {
        if self.current.as_ref() == Some(&workspace) {
            match &payload {
                WorkspacePayload::Snapshot(snapshot) => {
                    self.view.snapshot = Some(snapshot.clone());
                }
                WorkspacePayload::Documents(documents) => {
                    self.view.documents = documents.clone();
                }
            }
            self.view.loading = false;
            self.view.error = None;
        }
        let key = CacheKey {
            kind: payload.kind(),
            workspace,
        };
        self.entries.insert(key, CachedData::new(payload));
    }

    pub fn get(&self, kind: DataKind, workspace: &WorkspaceId) -> Option<&CachedData<WorkspacePayload>> {
        self.entries.get(&CacheKey {
            kind,
            workspace: workspace.clone(),
        })
    }

    /// Whether the fetching layer needs to hit the network for this data.
    pub fn needs_fetch(&self, kind: DataKind, workspace: &WorkspaceId) -> bool {
        self.get(kind, workspace)
            .map(|entry| entry.is_stale())
            .unwrap_or(true)
    }

    /// Drop a single entry. A miss is not an error.
    pub fn invalidate(&mut self, kind: DataKind, workspace: &WorkspaceId) {
        self.entries.remove(&CacheKey {
            kind,
            workspace: workspace.clone(),
        });
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.view.loading = loading;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.view.error = error;
    }

    /// Scope exit (the workspace screen is closed): transient state is
    /// reset, the data cache is kept so re-entry is instant.
    pub fn close(&mut self) {
        self.view.loading = false;
        self.view.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, name: &str) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            id: WorkspaceId::from(id),
            name: name.to_string(),
            document_count: 3,
            member_count: Some(2),
            created_at: None,
        }
    }

    fn documents(title: &str) -> Vec<DocumentSummary> {
        vec![DocumentSummary {
            id: format!("doc-{title}"),
            title: title.to_string(),
            page_count: Some(4),
            status: crate::models::OcrStatus::Completed,
            uploaded_at: None,
        }]
    }

    #[test]
    fn test_first_load_reuses_cache_hit_without_loading() {
        let mut cache = WorkspaceCache::new();
        cache.insert(
            WorkspaceId::from("ws-2"),
            WorkspacePayload::Snapshot(snapshot("ws-2", "Invoices")),
        );

        cache.enter(WorkspaceId::from("ws-2"));

        // The cached payload is visible immediately; no loading flash.
        assert!(!cache.view.loading);
        assert_eq!(cache.view.snapshot.as_ref().expect("snapshot").name, "Invoices");
        assert!(cache.get(DataKind::Snapshot, &WorkspaceId::from("ws-2")).is_some());
    }

    #[test]
    fn test_switch_purges_only_the_workspace_left() {
        let mut cache = WorkspaceCache::new();
        cache.enter(WorkspaceId::from("ws-1"));
        cache.insert(
            WorkspaceId::from("ws-1"),
            WorkspacePayload::Snapshot(snapshot("ws-1", "Contracts")),
        );
        cache.insert(
            WorkspaceId::from("ws-1"),
            WorkspacePayload::Documents(documents("nda")),
        );
        cache.insert(
            WorkspaceId::from("ws-2"),
            WorkspacePayload::Snapshot(snapshot("ws-2", "Invoices")),
        );

        cache.enter(WorkspaceId::from("ws-2"));

        // Everything tagged ws-1 is gone; ws-2 survived and now backs the view.
        assert!(cache.get(DataKind::Snapshot, &WorkspaceId::from("ws-1")).is_none());
        assert!(cache.get(DataKind::Documents, &WorkspaceId::from("ws-1")).is_none());
        assert!(cache.get(DataKind::Snapshot, &WorkspaceId::from("ws-2")).is_some());
        assert_eq!(cache.view.snapshot.as_ref().expect("snapshot").name, "Invoices");
        assert!(cache.view.documents.is_empty());
    }

    #[test]
    fn test_switch_back_requires_refetch() {
        // Purge-on-leave: revisiting a workspace after switching away
        // starts from an empty cache for it.
        let mut cache = WorkspaceCache::new();
        cache.enter(WorkspaceId::from("ws-1"));
        cache.insert(
            WorkspaceId::from("ws-1"),
            WorkspacePayload::Snapshot(snapshot("ws-1", "Contracts")),
        );

        cache.enter(WorkspaceId::from("ws-2"));
        cache.enter(WorkspaceId::from("ws-1"));

        assert!(cache.needs_fetch(DataKind::Snapshot, &WorkspaceId::from("ws-1")));
        assert!(cache.view.snapshot.is_none());
    }

    #[test]
    fn test_reentering_the_same_workspace_purges_nothing() {
        let mut cache = WorkspaceCache::new();
        cache.enter(WorkspaceId::from("ws-1"));
        cache.insert(
            WorkspaceId::from("ws-1"),
            WorkspacePayload::Documents(documents("receipt")),
        );

        cache.enter(WorkspaceId::from("ws-1"));

        assert!(cache.get(DataKind::Documents, &WorkspaceId::from("ws-1")).is_some());
        assert_eq!(cache.view.documents.len(), 1);
    }

    #[test]
    fn test_insert_for_active_workspace_updates_view() {
        let mut cache = WorkspaceCache::new();
        cache.enter(WorkspaceId::from("ws-1"));
        cache.set_loading(true);

        cache.insert(
            WorkspaceId::from("ws-1"),
            WorkspacePayload::Documents(documents("scan")),
        );

        assert!(!cache.view.loading);
        assert_eq!(cache.view.documents.len(), 1);
    }

    #[test]
    fn test_insert_for_inactive_workspace_leaves_view_alone() {
        let mut cache = WorkspaceCache::new();
        cache.enter(WorkspaceId::from("ws-1"));

        cache.insert(
            WorkspaceId::from("ws-2"),
            WorkspacePayload::Snapshot(snapshot("ws-2", "Invoices")),
        );

        assert!(cache.view.snapshot.is_none());
        assert!(cache.get(DataKind::Snapshot, &WorkspaceId::from("ws-2")).is_some());
    }

    #[test]
    fn test_close_keeps_data_and_clears_transients() {
        let mut cache = WorkspaceCache::new();
        cache.enter(WorkspaceId::from("ws-1"));
        cache.insert(
            WorkspaceId::from("ws-1"),
            WorkspacePayload::Snapshot(snapshot("ws-1", "Contracts")),
        );
        cache.set_loading(true);
        cache.set_error(Some("timeout".to_string()));

        cache.close();

        assert!(!cache.view.loading);
        assert!(cache.view.error.is_none());
        assert!(cache.get(DataKind::Snapshot, &WorkspaceId::from("ws-1")).is_some());

        // Re-entry after close is served from cache.
        cache.enter(WorkspaceId::from("ws-1"));
        assert!(!cache.needs_fetch(DataKind::Snapshot, &WorkspaceId::from("ws-1")));
    }

    #[test]
    fn test_invalidate_miss_is_silent() {
        let mut cache = WorkspaceCache::new();
        cache.invalidate(DataKind::Documents, &WorkspaceId::from("ws-9"));
        assert!(cache.needs_fetch(DataKind::Documents, &WorkspaceId::from("ws-9")));
    }

    #[test]
    fn test_stale_entries_need_refetch() {
        let mut cache = WorkspaceCache::new();
        cache.enter(WorkspaceId::from("ws-1"));
        cache.insert(
            WorkspaceId::from("ws-1"),
            WorkspacePayload::Documents(documents("scan")),
        );
        assert!(!cache.needs_fetch(DataKind::Documents, &WorkspaceId::from("ws-1")));

        // Age the entry past the staleness horizon.
        let key = CacheKey {
            kind: DataKind::Documents,
            workspace: WorkspaceId::from("ws-1"),
        };
        if let Some(entry) = cache.entries.get_mut(&key) {
            entry.cached_at = Utc::now() - chrono::Duration::minutes(CACHE_STALE_MINUTES + 1);
        }
        assert!(cache.needs_fetch(DataKind::Documents, &WorkspaceId::from("ws-1")));
    }
}
