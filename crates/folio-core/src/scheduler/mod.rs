//! Sync scheduler
//!
//! The orchestrating state machine: Idle -> Syncing -> (Idle | Error) ->
//! Idle. Cycles are triggered by the periodic timer or by connectivity
//! being restored; a trigger while a cycle is in flight or while offline
//! is a no-op. Cycle failures are recorded on the shared state and in the
//! change log, never thrown at the caller — the surrounding application
//! polls [`SyncState`](crate::models::SyncState) instead of catching
//! errors from a background loop.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::changelog::ChangeLog;
use crate::config::SyncConfig;
use crate::conflict::{self, Winner};
use crate::device::DeviceIdentity;
use crate::error::{Error, Result};
use crate::gateway::ResilientGateway;
use crate::models::{
    ChangeAction, EntitySnapshot, EntityType, NewChangeLogEntry, SyncState, SyncStateHandle,
};
use crate::protocol::{RemoteChange, SyncClient, SyncTransport};
use crate::store::{PersistentStore, INITIALIZED_KEY, WATERMARK_KEY};
use crate::tracker::ChangeTracker;

/// Local entity storage the scheduler applies winning snapshots to
#[allow(async_fn_in_trait)]
pub trait EntityStore {
    /// Fetch the local snapshot of an entity, if present
    async fn get(&self, entity_type: EntityType, entity_id: &str)
        -> Result<Option<EntitySnapshot>>;

    /// Store a snapshot, replacing any previous version in full
    async fn put(&self, snapshot: EntitySnapshot) -> Result<()>;

    /// Remove an entity, if present
    async fn delete(&self, entity_type: EntityType, entity_id: &str) -> Result<()>;
}

impl<E: EntityStore> EntityStore for Arc<E> {
    async fn get(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<EntitySnapshot>> {
        (**self).get(entity_type, entity_id).await
    }

    async fn put(&self, snapshot: EntitySnapshot) -> Result<()> {
        (**self).put(snapshot).await
    }

    async fn delete(&self, entity_type: EntityType, entity_id: &str) -> Result<()> {
        (**self).delete(entity_type, entity_id).await
    }
}

/// In-memory [`EntityStore`], used by tests
#[derive(Default)]
pub struct MemoryEntityStore {
    entities: RwLock<HashMap<(EntityType, String), EntitySnapshot>>,
}

impl MemoryEntityStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the store holds no entities
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl EntityStore for MemoryEntityStore {
    async fn get(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<EntitySnapshot>> {
        Ok(self
            .entities
            .read()
            .get(&(entity_type, entity_id.to_string()))
            .cloned())
    }

    async fn put(&self, snapshot: EntitySnapshot) -> Result<()> {
        self.entities.write().insert(
            (snapshot.entity_type, snapshot.entity_id.clone()),
            snapshot,
        );
        Ok(())
    }

    async fn delete(&self, entity_type: EntityType, entity_id: &str) -> Result<()> {
        self.entities
            .write()
            .remove(&(entity_type, entity_id.to_string()));
        Ok(())
    }
}

/// Why a sync trigger did not start a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The device is offline
    Offline,
    /// A cycle is already in flight
    AlreadyRunning,
}

/// Summary of a completed sync cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries uploaded this cycle
    pub uploaded: usize,
    /// Remote changes received this cycle
    pub downloaded: usize,
    /// Remote changes that met an existing local version
    pub conflicts_resolved: usize,
    /// The new watermark
    pub completed_at: DateTime<Utc>,
}

/// Result of a sync trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Upload and download both succeeded; the watermark advanced
    Completed(SyncReport),
    /// The trigger was a no-op
    NotAttempted(SkipReason),
    /// The cycle aborted; the reason is recorded on the sync state and
    /// in the change log
    Failed(String),
}

/// The background sync orchestrator.
///
/// Constructed once at startup and shared by handle with every
/// collaborator that records mutations or displays status.
pub struct SyncScheduler<T: SyncTransport, E: EntityStore> {
    config: SyncConfig,
    client: SyncClient<T>,
    changelog: ChangeLog,
    tracker: ChangeTracker,
    entities: E,
    store: Arc<dyn PersistentStore>,
    status: SyncStateHandle,
    device: DeviceIdentity,
    in_flight: AtomicBool,
}

impl<T: SyncTransport, E: EntityStore> SyncScheduler<T, E> {
    /// Create a scheduler, restoring the watermark persisted by earlier
    /// runs
    pub fn new(
        config: SyncConfig,
        transport: T,
        changelog: ChangeLog,
        entities: E,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        let status = SyncStateHandle::new();
        let gateway = ResilientGateway::new(status.clone());
        let device = DeviceIdentity::new(Arc::clone(&store));
        let tracker = ChangeTracker::new(changelog.clone());

        status.update(|state| state.last_sync_watermark = load_watermark(store.as_ref()));

        let scheduler = Self {
            config,
            client: SyncClient::new(transport, gateway),
            changelog,
            tracker,
            entities,
            store,
            status,
            device,
            in_flight: AtomicBool::new(false),
        };
        scheduler.refresh_pending();
        scheduler
    }

    /// Snapshot of the current sync state
    #[must_use]
    pub fn status(&self) -> SyncState {
        self.status.snapshot()
    }

    /// Handle to the shared sync state, for status displays
    #[must_use]
    pub fn status_handle(&self) -> SyncStateHandle {
        self.status.clone()
    }

    /// Gateway for the application's ordinary remote reads, wired to the
    /// same status handle so degraded mode is visible alongside sync
    /// errors
    #[must_use]
    pub fn gateway(&self) -> ResilientGateway {
        ResilientGateway::new(self.status.clone())
    }

    /// The change log this scheduler synchronizes
    #[must_use]
    pub const fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    /// Record a local mutation and refresh the pending count.
    ///
    /// This is the mutation entry point collaborators should use so the
    /// displayed pending count stays consistent with the log.
    pub fn record(&self, entry: NewChangeLogEntry) -> i64 {
        let id = self.changelog.append(entry);
        self.refresh_pending();
        id
    }

    /// Recompute the pending count from the log and watermark
    pub fn refresh_pending(&self) {
        let watermark = self.status.snapshot().last_sync_watermark;
        let pending = self.tracker.pending_count(watermark);
        self.status.update(|state| state.pending_count = pending);
    }

    /// Update the connectivity flag; a transition back online triggers
    /// an immediate sync cycle
    pub async fn set_online(&self, online: bool) -> Option<SyncOutcome> {
        let mut was_online = false;
        self.status.update(|state| {
            was_online = state.is_online;
            state.is_online = online;
        });

        if online && !was_online {
            tracing::info!("Connectivity restored, starting sync");
            Some(self.sync().await)
        } else {
            None
        }
    }

    /// Run one sync cycle unless offline or already syncing.
    ///
    /// Failures are recorded, not returned as errors; the next regular
    /// tick is the retry mechanism.
    pub async fn sync(&self) -> SyncOutcome {
        if !self.status.snapshot().is_online {
            tracing::debug!("Sync not attempted: offline");
            return SyncOutcome::NotAttempted(SkipReason::Offline);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync not attempted: cycle already in flight");
            return SyncOutcome::NotAttempted(SkipReason::AlreadyRunning);
        }

        self.status.update(|state| state.sync_in_progress = true);

        let outcome = match self.run_cycle().await {
            Ok(report) => {
                // Watermark and pending count advance atomically with the
                // transition back to idle.
                self.status.update(|state| {
                    state.last_sync_watermark = Some(report.completed_at);
                    state.pending_count = 0;
                    state.last_error = None;
                });
                tracing::info!(
                    uploaded = report.uploaded,
                    downloaded = report.downloaded,
                    conflicts = report.conflicts_resolved,
                    "Sync cycle completed"
                );
                SyncOutcome::Completed(report)
            }
            Err(error) => {
                let reason = error.to_string();
                tracing::warn!("Sync cycle failed: {reason}");
                self.status
                    .update(|state| state.last_error = Some(reason.clone()));
                self.changelog.append(
                    NewChangeLogEntry::new(
                        "sync",
                        ChangeAction::SyncError,
                        EntityType::System,
                        "cycle",
                    )
                    .with_new_value(serde_json::json!({ "error": reason })),
                );
                SyncOutcome::Failed(reason)
            }
        };

        self.status.update(|state| state.sync_in_progress = false);
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    /// Timer loop; the host application spawns this once at startup
    pub async fn run(&self) {
        loop {
            tokio::time::sleep(self.config.sync_interval).await;
            self.sync().await;
        }
    }

    async fn run_cycle(&self) -> Result<SyncReport> {
        let device_id = self.device.get();
        let watermark = self.status.snapshot().last_sync_watermark;

        let batch = self.tracker.delta(watermark);
        let uploaded = batch.len();
        if !batch.is_empty() {
            self.client.upload(&device_id, &batch).await?;
        }

        let response = self.client.download(watermark, &device_id).await?;
        let downloaded = response.changes.len();

        let mut conflicts_resolved = 0;
        for change in response.changes {
            self.apply_remote_change(change, &mut conflicts_resolved)
                .await?;
        }

        let completed_at = Utc::now();
        self.persist_watermark(completed_at);

        Ok(SyncReport {
            uploaded,
            downloaded,
            conflicts_resolved,
            completed_at,
        })
    }

    /// Apply one downloaded change to local entity storage.
    ///
    /// Deletes follow the same last-writer-wins rule as writes: a remote
    /// delete only removes the local version when its timestamp is
    /// strictly later than the local modification time, so an older
    /// delete never discards a newer local edit.
    async fn apply_remote_change(
        &self,
        change: RemoteChange,
        conflicts_resolved: &mut usize,
    ) -> Result<()> {
        match change.action {
            ChangeAction::Delete => {
                match self
                    .entities
                    .get(change.entity_type, &change.entity_id)
                    .await?
                {
                    None => Ok(()),
                    Some(local) => {
                        *conflicts_resolved += 1;
                        if change.timestamp > local.effective_timestamp() {
                            self.entities
                                .delete(change.entity_type, &change.entity_id)
                                .await
                        } else {
                            tracing::debug!(
                                "Kept local {} {} over older remote delete",
                                change.entity_type,
                                change.entity_id
                            );
                            Ok(())
                        }
                    }
                }
            }
            ChangeAction::Create | ChangeAction::Update => {
                let data = change.new_value.ok_or_else(|| {
                    Error::Validation(format!(
                        "remote change for {} {} has no payload",
                        change.entity_type, change.entity_id
                    ))
                })?;
                let incoming = EntitySnapshot::new(
                    change.entity_type,
                    change.entity_id.clone(),
                    data,
                    change.timestamp,
                );

                match self
                    .entities
                    .get(change.entity_type, &change.entity_id)
                    .await?
                {
                    None => self.entities.put(incoming).await,
                    Some(local) => {
                        *conflicts_resolved += 1;
                        match conflict::resolve(&local, &incoming).winner {
                            Winner::Remote => self.entities.put(incoming).await,
                            Winner::Local => {
                                tracing::debug!(
                                    "Kept local {} {} over older remote version",
                                    change.entity_type,
                                    change.entity_id
                                );
                                Ok(())
                            }
                        }
                    }
                }
            }
            // Audit entries are local bookkeeping; a server echoing one
            // back is ignored.
            ChangeAction::SyncError => Ok(()),
        }
    }

    fn persist_watermark(&self, watermark: DateTime<Utc>) {
        if let Err(error) = self.store.set(WATERMARK_KEY, &watermark.to_rfc3339()) {
            tracing::warn!("Failed to persist sync watermark: {error}");
        }
        if let Err(error) = self.store.set(INITIALIZED_KEY, "true") {
            tracing::warn!("Failed to persist sync init flag: {error}");
        }
    }
}

fn load_watermark(store: &dyn PersistentStore) -> Option<DateTime<Utc>> {
    let raw = match store.get(WATERMARK_KEY) {
        Ok(value) => value?,
        Err(error) => {
            tracing::warn!("Failed to read persisted watermark: {error}");
            return None;
        }
    };

    match DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(error) => {
            tracing::warn!("Discarding unreadable watermark {raw:?}: {error}");
            None
        }
    }
}
