//! Change tracker
//!
//! Computes the delta of unsynchronized entries since a watermark. Pure
//! reads over the change log; used both to build the upload batch and to
//! report the pending count without a network call.

use chrono::{DateTime, Utc};

use crate::changelog::ChangeLog;
use crate::models::{ChangeAction, ChangeLogEntry};

/// Read-only view over the change log for sync purposes
#[derive(Clone)]
pub struct ChangeTracker {
    log: ChangeLog,
}

impl ChangeTracker {
    /// Create a tracker over the given change log
    #[must_use]
    pub const fn new(log: ChangeLog) -> Self {
        Self { log }
    }

    /// Entries strictly after `watermark` (all entries when `None`),
    /// restricted to syncable entity types, oldest first.
    ///
    /// Upload order must preserve the causal order of mutations to the
    /// same entity, so ties on timestamp keep insertion order.
    #[must_use]
    pub fn delta(&self, watermark: Option<DateTime<Utc>>) -> Vec<ChangeLogEntry> {
        let mut pending: Vec<ChangeLogEntry> = self
            .log
            .entries()
            .into_iter()
            .filter(|entry| entry.entity_type.is_syncable())
            .filter(|entry| entry.action != ChangeAction::SyncError)
            .filter(|entry| watermark.map_or(true, |mark| entry.timestamp > mark))
            .collect();

        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        pending
    }

    /// Number of entries `delta` would return for `watermark`
    #[must_use]
    pub fn pending_count(&self, watermark: Option<DateTime<Utc>>) -> usize {
        self.delta(watermark).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityType, NewChangeLogEntry};
    use pretty_assertions::assert_eq;

    fn tracked_log() -> (ChangeLog, ChangeTracker) {
        let log = ChangeLog::new(100);
        (log.clone(), ChangeTracker::new(log))
    }

    #[test]
    fn delta_without_watermark_returns_all_syncable_entries() {
        let (log, tracker) = tracked_log();
        log.append(NewChangeLogEntry::new(
            "maria",
            ChangeAction::Create,
            EntityType::Transaction,
            "tx-1",
        ));
        log.append(NewChangeLogEntry::new(
            "maria",
            ChangeAction::Update,
            EntityType::Settings,
            "theme",
        ));
        log.append(NewChangeLogEntry::new(
            "maria",
            ChangeAction::Create,
            EntityType::Voucher,
            "v-1",
        ));

        let delta = tracker.delta(None);
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].entity_id, "tx-1");
        assert_eq!(delta[1].entity_id, "v-1");
    }

    #[test]
    fn delta_is_strictly_after_watermark() {
        let (log, tracker) = tracked_log();
        log.append(NewChangeLogEntry::new(
            "maria",
            ChangeAction::Create,
            EntityType::Transaction,
            "tx-1",
        ));
        log.append(NewChangeLogEntry::new(
            "maria",
            ChangeAction::Create,
            EntityType::Transaction,
            "tx-2",
        ));

        let entries = log.entries();
        let first_ts = entries[0].timestamp;
        let last_ts = entries[1].timestamp;

        // A watermark equal to an entry's timestamp excludes that entry.
        let after_first: Vec<String> = tracker
            .delta(Some(first_ts))
            .into_iter()
            .map(|entry| entry.entity_id)
            .collect();
        assert!(!after_first.contains(&"tx-1".to_string()));

        assert!(tracker.delta(Some(last_ts)).is_empty());
        assert_eq!(tracker.pending_count(Some(last_ts)), 0);
    }

    #[test]
    fn delta_is_oldest_first_with_insertion_order_ties() {
        let (log, tracker) = tracked_log();
        for i in 0..5 {
            log.append(NewChangeLogEntry::new(
                "maria",
                ChangeAction::Update,
                EntityType::Transaction,
                format!("tx-{i}"),
            ));
        }

        let delta = tracker.delta(None);
        assert!(delta
            .windows(2)
            .all(|pair| (pair[0].timestamp, pair[0].id) < (pair[1].timestamp, pair[1].id)));
    }

    #[test]
    fn sync_error_entries_are_never_uploaded() {
        let (log, tracker) = tracked_log();
        log.append(
            NewChangeLogEntry::new(
                "sync",
                ChangeAction::SyncError,
                EntityType::System,
                "cycle",
            )
            .with_new_value(serde_json::json!({"error": "Request timed out"})),
        );

        assert!(tracker.delta(None).is_empty());
        assert_eq!(tracker.pending_count(None), 0);
    }
}
