//! Change log entry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityType;

/// The kind of mutation a change log entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    /// A new entity was created
    Create,
    /// An existing entity was modified
    Update,
    /// An entity was removed
    Delete,
    /// A sync cycle failed; the entry carries the reason for audit purposes
    SyncError,
}

/// One immutable entry in the local change log.
///
/// Entries are ordered by `timestamp`; ties are broken by `id`, which
/// reflects insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Monotonically increasing identifier assigned on append
    pub id: i64,
    /// The acting user at the time of the mutation
    pub actor_name: String,
    /// What happened
    pub action: ChangeAction,
    /// Which entity kind was touched
    pub entity_type: EntityType,
    /// Which entity was touched
    pub entity_id: String,
    /// Snapshot of the entity before the mutation, when available
    pub old_value: Option<serde_json::Value>,
    /// Snapshot of the entity after the mutation, when available
    pub new_value: Option<serde_json::Value>,
    /// When the mutation was recorded
    pub timestamp: DateTime<Utc>,
}

/// A change log entry before the store assigns its id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeLogEntry {
    /// The acting user
    pub actor_name: String,
    /// What happened
    pub action: ChangeAction,
    /// Which entity kind was touched
    pub entity_type: EntityType,
    /// Which entity was touched
    pub entity_id: String,
    /// Snapshot before the mutation
    pub old_value: Option<serde_json::Value>,
    /// Snapshot after the mutation
    pub new_value: Option<serde_json::Value>,
}

impl NewChangeLogEntry {
    /// Create an entry with no snapshots attached
    #[must_use]
    pub fn new(
        actor_name: impl Into<String>,
        action: ChangeAction,
        entity_type: EntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_name: actor_name.into(),
            action,
            entity_type,
            entity_id: entity_id.into(),
            old_value: None,
            new_value: None,
        }
    }

    /// Attach the pre-mutation snapshot
    #[must_use]
    pub fn with_old_value(mut self, value: serde_json::Value) -> Self {
        self.old_value = Some(value);
        self
    }

    /// Attach the post-mutation snapshot
    #[must_use]
    pub fn with_new_value(mut self, value: serde_json::Value) -> Self {
        self.new_value = Some(value);
        self
    }
}
