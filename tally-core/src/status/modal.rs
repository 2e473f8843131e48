//! Blocking "syncing your data" wait shown after a fresh sign-in.
//!
//! The wait ends on the first local store change that came from the remote,
//! or after a timeout, and the caller then reloads every app collection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::auth::AuthEvent;
use crate::store::{ChangeOrigin, StoreEvent};

pub const DEFAULT_MODAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-session UI flags.
#[derive(Debug, Default)]
pub struct SessionFlags {
    modal_shown: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modal_shown(&self) -> bool {
        self.modal_shown.load(Ordering::SeqCst)
    }

    /// Returns true only for the first call.
    fn claim_modal(&self) -> bool {
        !self.modal_shown.swap(true, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// Remote data landed in the local store.
    SyncObserved,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalOutcome {
    Reload(ReloadReason),
    NotShown,
}

#[derive(Debug, Clone)]
pub struct SyncModal {
    wait: Duration,
    flags: Arc<SessionFlags>,
}

impl SyncModal {
    pub fn new(flags: Arc<SessionFlags>) -> Self {
        Self {
            wait: DEFAULT_MODAL_TIMEOUT,
            flags,
        }
    }

    pub fn with_timeout(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.wait
    }

    /// Only a sign-in made during this session shows the modal, and only once.
    pub fn should_show(&self, event: &AuthEvent) -> bool {
        matches!(event, AuthEvent::SignedIn(_)) && !self.flags.modal_shown()
    }

    /// Waits for a remote-origin store change or the timeout.
    ///
    /// `store_events` should be subscribed before the sign-in so changes made
    /// by the initial merge are not missed.
    pub async fn await_sync(&self, store_events: &mut broadcast::Receiver<StoreEvent>) -> ReloadReason {
        let observed = async {
            loop {
                match store_events.recv().await {
                    Ok(event) if event.origin == ChangeOrigin::Remote => {
                        tracing::debug!("Remote change to '{}' ended the sync wait", event.key);
                        return;
                    }
                    Ok(_) => {}
                    // Missed events were changes too.
                    Err(broadcast::error::RecvError::Lagged(_)) => return,
                    Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
                }
            }
        };
        match tokio::time::timeout(self.wait, observed).await {
            Ok(()) => ReloadReason::SyncObserved,
            Err(_) => {
                tracing::info!("No remote data after {:?}; reloading anyway", self.wait);
                ReloadReason::TimedOut
            }
        }
    }

    /// Runs the modal for `event` if it qualifies.
    pub async fn handle(
        &self,
        event: &AuthEvent,
        store_events: &mut broadcast::Receiver<StoreEvent>,
    ) -> ModalOutcome {
        if !self.should_show(event) || !self.flags.claim_modal() {
            return ModalOutcome::NotShown;
        }
        ModalOutcome::Reload(self.await_sync(store_events).await)
    }
}
