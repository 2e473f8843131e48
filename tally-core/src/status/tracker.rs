//! Sync status state machine.

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::auth::{AuthEvent, AuthSession};
use crate::sync::{SyncEngine, SyncEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nobody is signed in.
    Offline,
    /// Signed in, nothing confirmed yet.
    Connected,
    /// Last sync step succeeded.
    Synced,
    Error(String),
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Offline => write!(f, "Offline"),
            SyncStatus::Connected => write!(f, "Connected"),
            SyncStatus::Synced => write!(f, "Synced"),
            SyncStatus::Error(e) => write!(f, "Sync error: {}", e),
        }
    }
}

/// Derives [`SyncStatus`] from auth and sync events only.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    status: SyncStatus,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            status: SyncStatus::Offline,
        }
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn status_text(&self) -> String {
        self.status.to_string()
    }

    /// Returns true if the status changed.
    pub fn on_auth_event(&mut self, event: &AuthEvent) -> bool {
        let next = match event.user() {
            Some(_) => SyncStatus::Connected,
            None => SyncStatus::Offline,
        };
        self.set(next)
    }

    /// Returns true if the status changed.
    pub fn on_sync_event(&mut self, event: &SyncEvent) -> bool {
        let next = match event {
            SyncEvent::Merged { .. } | SyncEvent::Pushed { .. } | SyncEvent::RemoteApplied { .. } => {
                if self.status == SyncStatus::Offline {
                    return false;
                }
                SyncStatus::Synced
            }
            SyncEvent::PushFailed { error, .. } | SyncEvent::Failed { error, .. } => {
                SyncStatus::Error(error.clone())
            }
            SyncEvent::Detached { .. } => SyncStatus::Offline,
            SyncEvent::Registered { .. } | SyncEvent::RemoteIgnored { .. } => return false,
        };
        self.set(next)
    }

    fn set(&mut self, next: SyncStatus) -> bool {
        if self.status == next {
            return false;
        }
        tracing::debug!("Sync status: {} -> {}", self.status, next);
        self.status = next;
        true
    }

    /// Follows `session` and `engine` in a background task and publishes
    /// every status change.
    pub fn spawn(session: &AuthSession, engine: &SyncEngine) -> (watch::Receiver<SyncStatus>, JoinHandle<()>) {
        let mut auth_events = session.subscribe();
        let mut sync_events = engine.subscribe();

        let mut tracker = StatusTracker::new();
        if session.current_user().is_some() {
            tracker.status = SyncStatus::Connected;
        }
        let (tx, rx) = watch::channel(tracker.status.clone());

        let task = tokio::spawn(async move {
            loop {
                // Auth first: a merge is only counted once the sign-in is seen.
                let changed = tokio::select! {
                    biased;
                    event = auth_events.recv() => match event {
                        Ok(event) => tracker.on_auth_event(&event),
                        Err(broadcast::error::RecvError::Lagged(_)) => false,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = sync_events.recv() => match event {
                        Ok(event) => tracker.on_sync_event(&event),
                        Err(broadcast::error::RecvError::Lagged(_)) => false,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                if changed && tx.send(tracker.status.clone()).is_err() {
                    break;
                }
            }
        });
        (rx, task)
    }
}
