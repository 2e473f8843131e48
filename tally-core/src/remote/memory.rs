//! In-process remote store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{DocPath, RemoteDocument, RemoteError, RemoteStore, Subscription};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Shared {
    docs: Mutex<HashMap<DocPath, RemoteDocument>>,
    channels: Mutex<HashMap<DocPath, broadcast::Sender<RemoteDocument>>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

/// Remote store kept in memory.
///
/// Clones share the same documents, so handing a clone to each simulated
/// device gives them one "cloud" to sync through.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    shared: Arc<Shared>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read and write fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    /// Current document at `path`, bypassing the offline switch.
    pub fn peek(&self, path: &DocPath) -> Option<RemoteDocument> {
        self.shared
            .docs
            .lock()
            .ok()
            .and_then(|docs| docs.get(path).cloned())
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.shared.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("network is offline".to_string()));
        }
        Ok(())
    }

    fn sender(&self, path: &DocPath) -> Result<broadcast::Sender<RemoteDocument>, RemoteError> {
        let mut channels = self
            .shared
            .channels
            .lock()
            .map_err(|_| RemoteError::LockPoisoned)?;
        Ok(channels
            .entry(path.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn read(&self, path: &DocPath) -> Result<Option<RemoteDocument>, RemoteError> {
        self.check_online()?;
        let docs = self.shared.docs.lock().map_err(|_| RemoteError::LockPoisoned)?;
        Ok(docs.get(path).cloned())
    }

    async fn write(&self, path: &DocPath, doc: RemoteDocument) -> Result<(), RemoteError> {
        self.check_online()?;
        {
            let mut docs = self.shared.docs.lock().map_err(|_| RemoteError::LockPoisoned)?;
            docs.insert(path.clone(), doc.clone());
        }
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.sender(path)?.send(doc);
        Ok(())
    }

    fn subscribe(&self, path: &DocPath) -> Result<Subscription, RemoteError> {
        Ok(Subscription::from_broadcast(self.sender(path)?.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::{DeviceId, Revision};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> RemoteDocument {
        RemoteDocument {
            data: value,
            revision: Revision::next(None, DeviceId::new()),
        }
    }

    #[tokio::test]
    async fn test_read_missing() {
        let store = MemoryRemoteStore::new();
        let path = DocPath::new("u1", "races");
        assert!(store.read(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read_and_count() {
        let store = MemoryRemoteStore::new();
        let path = DocPath::new("u1", "races");

        store.write(&path, doc(json!([1]))).await.unwrap();

        assert_eq!(store.read(&path).await.unwrap().unwrap().data, json!([1]));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_documents() {
        let store = MemoryRemoteStore::new();
        let other = store.clone();
        let path = DocPath::new("u1", "races");

        store.write(&path, doc(json!([1]))).await.unwrap();
        assert!(other.read(&path).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_subscribers_see_writes() {
        let store = MemoryRemoteStore::new();
        let path = DocPath::new("u1", "races");
        let mut sub = store.subscribe(&path).unwrap();

        store.write(&path, doc(json!(["a"]))).await.unwrap();
        store
            .write(&DocPath::new("u2", "races"), doc(json!(["other user"])))
            .await
            .unwrap();
        store.write(&path, doc(json!(["b"]))).await.unwrap();

        assert_eq!(sub.next().await.unwrap().data, json!(["a"]));
        assert_eq!(sub.next().await.unwrap().data, json!(["b"]));
    }

    #[tokio::test]
    async fn test_offline_fails() {
        let store = MemoryRemoteStore::new();
        let path = DocPath::new("u1", "races");
        store.set_offline(true);

        assert!(matches!(
            store.write(&path, doc(json!([]))).await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(store.read(&path).await.is_err());
        assert_eq!(store.write_count(), 0);

        store.set_offline(false);
        store.write(&path, doc(json!([]))).await.unwrap();
        assert!(store.peek(&path).is_some());
    }
}
