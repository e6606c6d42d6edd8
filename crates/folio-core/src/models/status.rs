//! Shared sync state snapshot and its process-wide handle

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Point-in-time view of the sync subsystem, for status displays.
///
/// There is one live instance per process, owned by the scheduler. Other
/// components read it as a snapshot and must tolerate staleness between
/// ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Whether the device currently believes it has connectivity
    pub is_online: bool,
    /// Boundary between already-synced and pending change log entries
    pub last_sync_watermark: Option<DateTime<Utc>>,
    /// Number of syncable entries after the watermark
    pub pending_count: usize,
    /// Whether a sync cycle is currently running
    pub sync_in_progress: bool,
    /// Reason the last cycle failed, if it did
    pub last_error: Option<String>,
    /// Whether the data gateway is serving fallback values because the
    /// backend looks misconfigured
    pub degraded: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            is_online: true,
            last_sync_watermark: None,
            pending_count: 0,
            sync_in_progress: false,
            last_error: None,
            degraded: false,
        }
    }
}

/// Cloneable handle to the process-wide [`SyncState`].
///
/// Reads always return a full snapshot; writers mutate under the lock so
/// a reader never observes a half-updated state.
#[derive(Debug, Clone, Default)]
pub struct SyncStateHandle {
    inner: Arc<RwLock<SyncState>>,
}

impl SyncStateHandle {
    /// Create a handle with the default (online, never-synced) state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state as an atomic snapshot
    #[must_use]
    pub fn snapshot(&self) -> SyncState {
        self.inner.read().clone()
    }

    /// Mutate the state under the write lock
    pub(crate) fn update(&self, mutate: impl FnOnce(&mut SyncState)) {
        mutate(&mut self.inner.write());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_online_and_unsynced() {
        let state = SyncState::default();
        assert!(state.is_online);
        assert!(state.last_sync_watermark.is_none());
        assert_eq!(state.pending_count, 0);
        assert!(!state.sync_in_progress);
        assert!(state.last_error.is_none());
        assert!(!state.degraded);
    }

    #[test]
    fn handle_snapshots_reflect_updates() {
        let handle = SyncStateHandle::new();
        handle.update(|state| {
            state.pending_count = 7;
            state.last_error = Some("timeout".to_string());
        });

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.pending_count, 7);
        assert_eq!(snapshot.last_error.as_deref(), Some("timeout"));

        // Clones observe the same underlying state.
        let clone = handle.clone();
        clone.update(|state| state.pending_count = 0);
        assert_eq!(handle.snapshot().pending_count, 0);
    }
}
