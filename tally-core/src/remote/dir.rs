//! Remote store kept as JSON files in a shared directory.
//!
//! Layout: `<root>/<user_id>/<collection>.json`, each file holding one
//! [`RemoteDocument`]. Several devices pointing at the same directory (a
//! network share or a synced folder) see each other's writes through a
//! polling watcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{validate_component, DocPath, RemoteDocument, RemoteError, RemoteStore, Subscription};

/// Default interval between checks for changed documents.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const WATCH_BUFFER: usize = 16;

#[derive(Debug, Clone)]
pub struct DirRemoteStore {
    root: PathBuf,
    poll_interval: Duration,
}

impl DirRemoteStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the document at `path`.
    pub fn document_path(&self, path: &DocPath) -> Result<PathBuf, RemoteError> {
        validate_component(&path.user_id)?;
        validate_component(&path.collection)?;
        Ok(self
            .root
            .join(&path.user_id)
            .join(format!("{}.json", path.collection)))
    }
}

#[async_trait]
impl RemoteStore for DirRemoteStore {
    async fn read(&self, path: &DocPath) -> Result<Option<RemoteDocument>, RemoteError> {
        let file = self.document_path(path)?;
        read_document(&file)
    }

    async fn write(&self, path: &DocPath, doc: RemoteDocument) -> Result<(), RemoteError> {
        let file = self.document_path(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| RemoteError::Io(parent.to_path_buf(), e))?;
        }
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| RemoteError::Malformed(path.to_string(), e.to_string()))?;

        // Unique temp name so concurrent writers never share one.
        let tmp = file.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, json).map_err(|e| RemoteError::Io(tmp.clone(), e))?;
        fs::rename(&tmp, &file).map_err(|e| RemoteError::Io(file.clone(), e))?;
        tracing::debug!("Wrote {} at {}", path, doc.revision);
        Ok(())
    }

    fn subscribe(&self, path: &DocPath) -> Result<Subscription, RemoteError> {
        let file = self.document_path(path)?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| RemoteError::Unavailable("no async runtime to run the watcher".to_string()))?;

        let initial = match read_document(&file) {
            Ok(doc) => doc.map(|d| d.revision),
            Err(e) => {
                tracing::warn!("Watching {} from an unreadable state: {}", path, e);
                None
            }
        };

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let interval = self.poll_interval;
        let label = path.to_string();
        let task = handle.spawn(async move {
            let mut last_seen = initial;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let doc = match read_document(&file) {
                    Ok(Some(doc)) => doc,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::debug!("Skipping unreadable {}: {}", label, e);
                        continue;
                    }
                };
                if last_seen.is_some_and(|seen| seen.same_write(&doc.revision)) {
                    continue;
                }
                last_seen = Some(doc.revision);
                if tx.send(doc).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::from_watcher(rx, task))
    }
}

fn read_document(file: &Path) -> Result<Option<RemoteDocument>, RemoteError> {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RemoteError::Io(file.to_path_buf(), e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RemoteError::Malformed(file.display().to_string(), e.to_string()))
}
