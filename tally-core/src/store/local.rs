//! JSON-typed local store with change notifications.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use super::{FileBackend, KeyValueBackend, MemoryBackend, StoreError};
use crate::events::EventBus;

/// Who caused a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A local user action.
    Local,
    /// The sync engine applying data received from the remote store.
    Remote,
}

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Set,
    Removed,
}

/// Published after every successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    pub change: StoreChange,
    pub origin: ChangeOrigin,
}

/// Local key-value store holding JSON values.
///
/// Cloning is cheap; clones share the backend and the event bus.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueBackend>,
    events: EventBus<StoreEvent>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

impl LocalStore {
    pub fn new(backend: impl KeyValueBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            events: EventBus::new(),
        }
    }

    /// Creates a store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Opens a file-backed store in `dir`.
    pub fn open(dir: PathBuf) -> Self {
        Self::new(FileBackend::new(dir))
    }

    /// Subscribes to mutation events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Reads `key`, falling back to `T::default()` when the key is missing
    /// or its value cannot be read or parsed. Never fails.
    pub fn get<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!("Falling back to empty value for '{}': {}", key, e);
                T::default()
            }
        }
    }

    /// Reads and parses `key`; `Ok(None)` if absent.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.backend.read(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Parse(key.to_string(), e.to_string())),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key` as a local change.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.set_with_origin(key, value, ChangeOrigin::Local)
    }

    /// Stores `value` under `key`, tagging the change with `origin`.
    pub fn set_with_origin<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        origin: ChangeOrigin,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StoreError::Serialize(key.to_string(), e.to_string()))?;
        self.backend.write(key, &raw)?;
        self.events.publish(StoreEvent {
            key: key.to_string(),
            change: StoreChange::Set,
            origin,
        });
        Ok(())
    }

    /// Removes a single key.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.backend.delete(key)?;
        self.events.publish(StoreEvent {
            key: key.to_string(),
            change: StoreChange::Removed,
            origin: ChangeOrigin::Local,
        });
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.backend.read(key), Ok(Some(_)))
    }

    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.backend.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Names {
        player1: String,
        player2: String,
    }

    #[test]
    fn test_missing_key_returns_default() {
        let store = LocalStore::in_memory();
        let races: Vec<u32> = store.get("marioKartRaces");
        assert!(races.is_empty());
    }

    #[test]
    fn test_set_get_roundtrip() {
        let store = LocalStore::in_memory();
        let names = Names {
            player1: "Mario".into(),
            player2: "Luigi".into(),
        };

        store.set("names", &names).unwrap();

        let loaded: Names = store.get("names");
        assert_eq!(loaded, names);
    }

    #[test]
    fn test_corrupt_value_falls_back_to_default() {
        let backend = MemoryBackend::new();
        backend.write("races", "{not json").unwrap();
        let store = LocalStore::new(backend);

        let races: Vec<u32> = store.get("races");
        assert!(races.is_empty());
        assert!(matches!(
            store.try_get::<Vec<u32>>("races"),
            Err(StoreError::Parse(_, _))
        ));
    }

    #[test]
    fn test_wrong_shape_falls_back_to_default() {
        let store = LocalStore::in_memory();
        store.set("races", &serde_json::json!({"not": "a list"})).unwrap();

        let races: Vec<u32> = store.get("races");
        assert!(races.is_empty());
    }

    #[test]
    fn test_remove_only_affects_one_key() {
        let store = LocalStore::in_memory();
        store.set("a", &1).unwrap();
        store.set("b", &2).unwrap();

        store.remove("a").unwrap();

        assert!(!store.contains("a"));
        assert_eq!(store.get::<u32>("b"), 2);
        assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(temp_dir.path().to_path_buf());
        store.set("races", &vec![1, 2, 3]).unwrap();

        let reopened = LocalStore::open(temp_dir.path().to_path_buf());
        assert_eq!(reopened.get::<Vec<u32>>("races"), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_mutations_publish_events() {
        let store = LocalStore::in_memory();
        let mut rx = store.subscribe();

        store.set("races", &Vec::<u32>::new()).unwrap();
        store
            .set_with_origin("races", &vec![1], ChangeOrigin::Remote)
            .unwrap();
        store.remove("races").unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.change, StoreChange::Set);
        assert_eq!(first.origin, ChangeOrigin::Local);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.origin, ChangeOrigin::Remote);

        let third = rx.recv().await.unwrap();
        assert_eq!(third.change, StoreChange::Removed);
        assert_eq!(third.key, "races");
    }

    #[test]
    fn test_failed_write_publishes_nothing() {
        let store = LocalStore::in_memory();
        let mut rx = store.subscribe();

        assert!(store.set("", &1).is_err());
        assert!(rx.try_recv().is_err());
    }
}
