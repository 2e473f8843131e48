//! Remote document store contract.
//!
//! The remote side holds one document per `{user, collection}` containing
//! the same JSON value as the local store plus its [`Revision`]. The sync
//! engine needs only three operations: read, write and subscribe. Dropping a
//! [`Subscription`] unsubscribes.
//!
//! Two implementations ship with the crate:
//! - [`MemoryRemoteStore`]: shared in-process store, used for tests and for
//!   several simulated devices in one process
//! - [`DirRemoteStore`]: documents as JSON files in a directory that several
//!   devices can share, with a polling watcher

mod dir;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::revision::Revision;

pub use dir::DirRemoteStore;
pub use memory::MemoryRemoteStore;

/// Location of one remote document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    pub user_id: String,
    pub collection: String,
}

impl DocPath {
    pub fn new(user_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "users/{}/{}", self.user_id, self.collection)
    }
}

/// A remote document: the collection value and the revision that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub data: serde_json::Value,
    pub revision: Revision,
}

/// Errors that can occur talking to a remote store.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Store cannot be reached right now.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// Path component is empty or contains separators.
    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(std::path::PathBuf, #[source] std::io::Error),

    #[error("Malformed remote document {0}: {1}")]
    Malformed(String, String),

    #[error("remote store lock was poisoned")]
    LockPoisoned,
}

/// Remote document store used by the sync engine.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads a document; `Ok(None)` if it has never been written.
    async fn read(&self, path: &DocPath) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Replaces a document and notifies subscribers.
    async fn write(&self, path: &DocPath, doc: RemoteDocument) -> Result<(), RemoteError>;

    /// Subscribes to future writes of a document.
    fn subscribe(&self, path: &DocPath) -> Result<Subscription, RemoteError>;
}

/// Stream of remote document changes. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    inner: SubscriptionInner,
}

#[derive(Debug)]
enum SubscriptionInner {
    Broadcast(broadcast::Receiver<RemoteDocument>),
    Watcher {
        receiver: mpsc::Receiver<RemoteDocument>,
        task: JoinHandle<()>,
    },
}

impl Subscription {
    pub(crate) fn from_broadcast(receiver: broadcast::Receiver<RemoteDocument>) -> Self {
        Self {
            inner: SubscriptionInner::Broadcast(receiver),
        }
    }

    pub(crate) fn from_watcher(receiver: mpsc::Receiver<RemoteDocument>, task: JoinHandle<()>) -> Self {
        Self {
            inner: SubscriptionInner::Watcher { receiver, task },
        }
    }

    /// Waits for the next change. `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<RemoteDocument> {
        match &mut self.inner {
            SubscriptionInner::Broadcast(receiver) => loop {
                match receiver.recv().await {
                    Ok(doc) => return Some(doc),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Remote subscription lagged; skipped {} change(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            SubscriptionInner::Watcher { receiver, .. } => receiver.recv().await,
        }
    }

    /// Stops receiving changes.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let SubscriptionInner::Watcher { task, .. } = &self.inner {
            task.abort();
        }
    }
}

/// Rejects path components that are empty or would escape a directory.
pub(crate) fn validate_component(component: &str) -> Result<(), RemoteError> {
    if component.is_empty()
        || component.contains('/')
        || component.contains('\\')
        || component.contains("..")
        || component.starts_with('.')
    {
        return Err(RemoteError::InvalidPath(component.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_path_display() {
        let path = DocPath::new("u1", "marioKart");
        assert_eq!(path.to_string(), "users/u1/marioKart");
    }

    #[test]
    fn test_validate_component() {
        assert!(validate_component("marioKart").is_ok());
        for bad in ["", "..", "a/b", ".hidden"] {
            assert!(validate_component(bad).is_err());
        }
    }
}
