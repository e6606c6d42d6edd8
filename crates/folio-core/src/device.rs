//! Stable per-installation device identity
//!
//! The device id attributes uploaded changes and lets the server filter
//! echoes on download. UUID v7 combines a random component with the
//! current time, matching the "random + time" identity scheme.

use std::sync::Arc;
use uuid::Uuid;

use crate::store::{PersistentStore, DEVICE_ID_KEY};

/// Lazily generated, persisted device identifier
#[derive(Clone)]
pub struct DeviceIdentity {
    store: Arc<dyn PersistentStore>,
}

impl DeviceIdentity {
    /// Create an identity backed by the given store
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self { store }
    }

    /// The device id for this installation.
    ///
    /// Generated and persisted on first call. If persistence is
    /// unavailable, a fresh id is returned per call: sync keeps working
    /// but loses de-duplication across restarts.
    #[must_use]
    pub fn get(&self) -> String {
        match self.store.get(DEVICE_ID_KEY) {
            Ok(Some(id)) if !id.trim().is_empty() => return id,
            Ok(_) => {}
            Err(error) => {
                tracing::warn!("Failed to read device id: {error}");
            }
        }

        let id = Uuid::now_v7().to_string();
        if let Err(error) = self.store.set(DEVICE_ID_KEY, &id) {
            tracing::warn!("Failed to persist device id, it will not survive a restart: {error}");
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::store::MemoryStore;

    #[test]
    fn get_is_stable_once_persisted() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let identity = DeviceIdentity::new(Arc::clone(&store));

        let first = identity.get();
        let second = identity.get();
        assert_eq!(first, second);

        // A new handle over the same store sees the same id.
        let other = DeviceIdentity::new(store);
        assert_eq!(other.get(), first);
    }

    struct UnavailableStore;

    impl PersistentStore for UnavailableStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Store("disk unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Store("disk unavailable".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Err(Error::Store("disk unavailable".to_string()))
        }
    }

    #[test]
    fn unavailable_store_yields_fresh_ids() {
        let identity = DeviceIdentity::new(Arc::new(UnavailableStore));

        let first = identity.get();
        let second = identity.get();
        assert_ne!(first, second);
        assert!(!first.is_empty());
    }
}
