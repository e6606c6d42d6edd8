//! Conflict resolution
//!
//! Last-writer-wins over whole snapshots: the version with the later
//! modification timestamp is kept in full and the other is discarded.
//! Field-level merging is deliberately not attempted.

use crate::models::EntitySnapshot;

/// Which side a resolution kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The local snapshot was kept
    Local,
    /// The remote snapshot was kept
    Remote,
}

/// Outcome of resolving one local/remote pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    /// Which side won
    pub winner: Winner,
    /// The snapshot to keep, in full
    pub snapshot: &'a EntitySnapshot,
}

/// Resolve a local and a remote version of the same entity.
///
/// Compares `updated_at`, falling back to `created_at` when absent. Equal
/// timestamps keep the local snapshot: the device's own copy is not
/// churned for a remote version that is no newer.
#[must_use]
pub fn resolve<'a>(local: &'a EntitySnapshot, remote: &'a EntitySnapshot) -> Resolution<'a> {
    if remote.effective_timestamp() > local.effective_timestamp() {
        Resolution {
            winner: Winner::Remote,
            snapshot: remote,
        }
    } else {
        Resolution {
            winner: Winner::Local,
            snapshot: local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn snapshot_at(entity_id: &str, data: serde_json::Value, ts: i64) -> EntitySnapshot {
        EntitySnapshot::new(
            EntityType::Transaction,
            entity_id,
            data,
            Utc.timestamp_opt(ts, 0).unwrap(),
        )
    }

    #[test]
    fn later_remote_wins_in_full() {
        let local = snapshot_at("tx-1", serde_json::json!({"amount": 100, "note": "local"}), 1000);
        let remote = snapshot_at("tx-1", serde_json::json!({"amount": 250}), 1001);

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, Winner::Remote);
        // The winning snapshot is kept whole; no field merge happens.
        assert_eq!(resolution.snapshot, &remote);
        assert_eq!(resolution.snapshot.data, serde_json::json!({"amount": 250}));
    }

    #[test]
    fn later_local_wins() {
        let local = snapshot_at("tx-1", serde_json::json!({"amount": 100}), 2000);
        let remote = snapshot_at("tx-1", serde_json::json!({"amount": 250}), 1500);

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.snapshot, &local);
    }

    #[test]
    fn equal_timestamps_keep_local() {
        let local = snapshot_at("tx-1", serde_json::json!({"amount": 100}), 1000);
        let remote = snapshot_at("tx-1", serde_json::json!({"amount": 250}), 1000);

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, Winner::Local);
        assert_eq!(resolution.snapshot, &local);
    }

    #[test]
    fn missing_updated_at_falls_back_to_created_at() {
        let mut local = snapshot_at("tx-1", serde_json::json!({"amount": 100}), 1000);
        local.updated_at = None;
        let remote = snapshot_at("tx-1", serde_json::json!({"amount": 250}), 1001);

        assert_eq!(resolve(&local, &remote).winner, Winner::Remote);

        let mut stale_remote = snapshot_at("tx-1", serde_json::json!({"amount": 250}), 900);
        stale_remote.updated_at = None;
        assert_eq!(resolve(&local, &stale_remote).winner, Winner::Local);
    }
}
