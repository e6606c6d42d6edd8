//! folio-core - Core library for Folio
//!
//! This crate contains the offline-first change log, sync protocol client,
//! conflict resolution, and background sync scheduler shared by all Folio
//! interfaces.

pub mod changelog;
pub mod config;
pub mod conflict;
pub mod device;
pub mod error;
pub mod gateway;
pub mod models;
pub mod protocol;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use changelog::{ChangeLog, ChangeLogQuery};
pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{
    ChangeAction, ChangeLogEntry, EntitySnapshot, EntityType, NewChangeLogEntry, SyncState,
};
pub use scheduler::{EntityStore, SyncOutcome, SyncScheduler};
