//! Shared model types for folio-core

mod change_log;
mod entity;
mod status;

pub use change_log::{ChangeAction, ChangeLogEntry, NewChangeLogEntry};
pub use entity::{EntitySnapshot, EntityType};
pub use status::{SyncState, SyncStateHandle};
