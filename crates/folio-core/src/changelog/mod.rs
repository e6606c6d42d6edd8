//! Append-only change log store
//!
//! The local ledger of mutations and the source of truth for "what
//! changed" since the last sync. Entries are immutable once appended and
//! only leave the log through capacity-based FIFO eviction or an explicit
//! retention sweep.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ChangeAction, ChangeLogEntry, EntityType, NewChangeLogEntry};
use crate::store::{PersistentStore, CHANGE_LOG_KEY};

/// Filters for [`ChangeLog::query`]; all present filters are ANDed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLogQuery {
    /// Restrict to entries recorded by this actor
    pub actor: Option<String>,
    /// Restrict to one action kind
    pub action: Option<ChangeAction>,
    /// Restrict to one entity kind
    pub entity_type: Option<EntityType>,
    /// Only entries at or after this instant
    pub from_time: Option<DateTime<Utc>>,
    /// Only entries at or before this instant
    pub to_time: Option<DateTime<Utc>>,
    /// Cap on the number of entries returned
    pub limit: Option<usize>,
}

impl ChangeLogQuery {
    /// Restrict to entries recorded by `actor`
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Restrict to one action kind
    #[must_use]
    pub const fn with_action(mut self, action: ChangeAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Restrict to one entity kind
    #[must_use]
    pub const fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Only entries at or after `from`
    #[must_use]
    pub const fn with_from_time(mut self, from: DateTime<Utc>) -> Self {
        self.from_time = Some(from);
        self
    }

    /// Only entries at or before `to`
    #[must_use]
    pub const fn with_to_time(mut self, to: DateTime<Utc>) -> Self {
        self.to_time = Some(to);
        self
    }

    /// Cap the number of entries returned
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &ChangeLogEntry) -> bool {
        if let Some(actor) = &self.actor {
            if &entry.actor_name != actor {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(entity_type) = self.entity_type {
            if entry.entity_type != entity_type {
                return false;
            }
        }
        if let Some(from) = self.from_time {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to_time {
            if entry.timestamp > to {
                return false;
            }
        }
        true
    }
}

struct LogInner {
    entries: VecDeque<ChangeLogEntry>,
    next_id: i64,
    capacity: usize,
    store: Option<Arc<dyn PersistentStore>>,
}

/// Thread-safe append-only change log, shared by cloning.
///
/// Persistence is best-effort: a failed write is logged and swallowed so
/// audit logging never blocks the mutation it describes.
#[derive(Clone)]
pub struct ChangeLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ChangeLog {
    /// Create an in-memory change log with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                entries: VecDeque::new(),
                next_id: 1,
                capacity,
                store: None,
            })),
        }
    }

    /// Create a change log backed by `store`, restoring any previously
    /// persisted entries.
    ///
    /// Unreadable persisted contents are discarded with a warning rather
    /// than failing startup.
    #[must_use]
    pub fn with_store(capacity: usize, store: Arc<dyn PersistentStore>) -> Self {
        let entries = Self::load_entries(store.as_ref());
        let next_id = entries.iter().map(|entry| entry.id).max().unwrap_or(0) + 1;

        Self {
            inner: Arc::new(Mutex::new(LogInner {
                entries,
                next_id,
                capacity,
                store: Some(store),
            })),
        }
    }

    fn load_entries(store: &dyn PersistentStore) -> VecDeque<ChangeLogEntry> {
        let raw = match store.get(CHANGE_LOG_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return VecDeque::new(),
            Err(error) => {
                tracing::warn!("Failed to read persisted change log: {error}");
                return VecDeque::new();
            }
        };

        match serde_json::from_str::<Vec<ChangeLogEntry>>(&raw) {
            Ok(entries) => entries.into(),
            Err(error) => {
                tracing::warn!("Discarding unreadable persisted change log: {error}");
                VecDeque::new()
            }
        }
    }

    /// Append a mutation record, assigning its id and timestamp.
    ///
    /// Evicts the oldest entry once the capacity is exceeded, regardless
    /// of whether that entry was ever uploaded.
    pub fn append(&self, new_entry: NewChangeLogEntry) -> i64 {
        let mut inner = self.inner.lock();

        let id = inner.next_id;
        inner.next_id += 1;

        inner.entries.push_back(ChangeLogEntry {
            id,
            actor_name: new_entry.actor_name,
            action: new_entry.action,
            entity_type: new_entry.entity_type,
            entity_id: new_entry.entity_id,
            old_value: new_entry.old_value,
            new_value: new_entry.new_value,
            timestamp: Utc::now(),
        });

        while inner.entries.len() > inner.capacity {
            inner.entries.pop_front();
        }

        Self::persist(&inner);
        id
    }

    /// Return entries matching `query`, newest first.
    ///
    /// Ties on timestamp are broken by id so the order is stable across
    /// calls. Has no side effects.
    #[must_use]
    pub fn query(&self, query: &ChangeLogQuery) -> Vec<ChangeLogEntry> {
        let inner = self.inner.lock();
        let mut matches: Vec<ChangeLogEntry> = inner
            .entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        matches
    }

    /// Remove entries older than `cutoff`; returns how many were removed
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|entry| entry.timestamp >= cutoff);
        let removed = before - inner.entries.len();

        if removed > 0 {
            Self::persist(&inner);
        }
        removed
    }

    /// Snapshot of all entries in insertion order
    #[must_use]
    pub fn entries(&self) -> Vec<ChangeLogEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    /// Number of entries currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the log holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    fn persist(inner: &LogInner) {
        let Some(store) = &inner.store else {
            return;
        };

        let result: Result<()> = (|| {
            let entries: Vec<&ChangeLogEntry> = inner.entries.iter().collect();
            let payload = serde_json::to_string(&entries)?;
            store.set(CHANGE_LOG_KEY, &payload)
        })();

        if let Err(error) = result {
            // Log entries are best-effort, not transactional with the
            // mutation they describe.
            tracing::warn!("Failed to persist change log: {error}");
        }
    }
}
