//! Domain entity classification and snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain entity kinds tracked by the change log.
///
/// Only a subset is syncable; the rest stays on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A recorded tax transaction
    Transaction,
    /// A supplier/provider record
    Provider,
    /// A retention voucher
    Voucher,
    /// A client record
    Client,
    /// Local application settings (never synced)
    Settings,
    /// Internal bookkeeping entries such as sync error audits (never synced)
    System,
}

impl EntityType {
    /// Whether changes to this entity kind are uploaded to the remote service
    #[must_use]
    pub const fn is_syncable(self) -> bool {
        matches!(
            self,
            Self::Transaction | Self::Provider | Self::Voucher | Self::Client
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transaction => "transaction",
            Self::Provider => "provider",
            Self::Voucher => "voucher",
            Self::Client => "client",
            Self::Settings => "settings",
            Self::System => "system",
        };
        write!(f, "{name}")
    }
}

/// A full snapshot of one entity as held by local storage or received
/// from the remote service.
///
/// The conflict resolver compares snapshots as opaque wholes; `data` is
/// never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Entity kind
    pub entity_type: EntityType,
    /// Stable identifier within the entity kind
    pub entity_id: String,
    /// Entity payload
    pub data: serde_json::Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp, when known
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntitySnapshot {
    /// Create a snapshot stamped with the given modification time
    #[must_use]
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        data: serde_json::Value,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            data,
            created_at: modified_at,
            updated_at: Some(modified_at),
        }
    }

    /// The timestamp used for last-writer-wins comparison:
    /// `updated_at`, falling back to `created_at` when absent
    #[must_use]
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}
