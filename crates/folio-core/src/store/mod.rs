//! Key-value persistence layer for sync bookkeeping
//!
//! The sync subsystem persists a handful of small values (device id,
//! watermark, the change log itself) through a minimal key-value
//! abstraction so clients can back it with whatever storage they have.
//! Durability is best-effort by design: a failed write must never block
//! a user action.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Key under which the device identifier is persisted
pub const DEVICE_ID_KEY: &str = "sync/device_id";
/// Key under which the last successful sync watermark is persisted
pub const WATERMARK_KEY: &str = "sync/watermark";
/// Key under which the serialized change log is persisted
pub const CHANGE_LOG_KEY: &str = "sync/change_log";
/// Key marking that at least one sync cycle has completed on this install
pub const INITIALIZED_KEY: &str = "sync/initialized";

/// Best-effort key-value store for sync bookkeeping
pub trait PersistentStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`, if any
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store used by tests and as a fallback when no durable
/// location is available
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Single-file JSON store.
///
/// The whole map is rewritten on every mutation via a temp file rename,
/// so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing contents if the file
    /// is present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => Self::parse_contents(&raw, &path)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn parse_contents(raw: &str, path: &Path) -> Result<BTreeMap<String, String>> {
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = value else {
            return Err(Error::Store(format!(
                "{} does not contain a JSON object",
                path.display()
            )));
        };

        Ok(map
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(text) => Some((key, text)),
                _ => None,
            })
            .collect())
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let payload = serde_json::to_string_pretty(values)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, payload)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl PersistentStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock();
        values.remove(key);
        self.flush(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-state.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set(DEVICE_ID_KEY, "device-1").unwrap();
            store.set(WATERMARK_KEY, "2024-05-01T00:00:00Z").unwrap();
        }

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(DEVICE_ID_KEY).unwrap().as_deref(),
            Some("device-1")
        );
        assert_eq!(
            reopened.get(WATERMARK_KEY).unwrap().as_deref(),
            Some("2024-05-01T00:00:00Z")
        );
    }

    #[test]
    fn file_store_delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-state.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.set("k", "v").unwrap();
        store.delete("k").unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap(), None);
    }

    #[test]
    fn file_store_rejects_non_object_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-state.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(JsonFileStore::open(&path).is_err());
    }

    #[test]
    fn file_store_tolerates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-state.json");
        std::fs::write(&path, "").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
    }
}
