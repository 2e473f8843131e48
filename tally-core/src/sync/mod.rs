//! Multi-device sync of app collections.
//!
//! Each app registers a namespace with the [`SyncEngine`], naming the local
//! storage key and the remote collection it mirrors. While a user is signed
//! in, the engine keeps one remote listener and one push worker per
//! namespace:
//!
//! - local saves land in the local store first and are pushed in the
//!   background, in call order
//! - remote writes are arbitrated by revision and written locally with
//!   [`ChangeOrigin::Remote`](crate::store::ChangeOrigin::Remote), then handed
//!   to the app's update handler
//!
//! The first activation of a namespace after sign-in performs the initial
//! merge: non-empty remote data wins, otherwise non-empty local data seeds
//! the remote.

mod engine;
mod error;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::revision::{Arbitration, Revision};

pub use engine::{AppRegistration, NamespaceSnapshot, SyncEngine, SyncSnapshot, UpdateHandler};
pub use error::SyncError;

/// Result of the initial merge for one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergeOutcome {
    /// Remote data replaced the local collection.
    PulledRemote,
    /// Local data was pushed to an empty remote.
    SeededRemote,
    /// Both sides already hold the same write.
    InSync,
    /// Nothing on either side.
    Empty,
}

impl std::fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeOutcome::PulledRemote => write!(f, "pulled remote data"),
            MergeOutcome::SeededRemote => write!(f, "seeded remote from local data"),
            MergeOutcome::InSync => write!(f, "already in sync"),
            MergeOutcome::Empty => write!(f, "nothing to merge"),
        }
    }
}

/// Events published by the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Registered {
        namespace: String,
    },
    Merged {
        namespace: String,
        outcome: MergeOutcome,
    },
    Pushed {
        namespace: String,
        revision: Revision,
    },
    PushFailed {
        namespace: String,
        error: String,
    },
    RemoteApplied {
        namespace: String,
        revision: Revision,
    },
    RemoteIgnored {
        namespace: String,
        revision: Revision,
        reason: Arbitration,
    },
    /// Sign-out dropped every registration.
    Detached {
        namespaces: usize,
    },
    /// Activation or merge failed.
    Failed {
        namespace: String,
        error: String,
    },
}

/// What happened to one queued push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Pushed(Revision),
    Failed(String),
    /// Nobody is signed in, so the save stayed local.
    Skipped,
}

/// Handle to a queued push. Dropping it does not cancel the push.
#[derive(Debug)]
pub struct PushHandle {
    receiver: Option<oneshot::Receiver<PushOutcome>>,
}

impl PushHandle {
    pub(crate) fn queued(receiver: oneshot::Receiver<PushOutcome>) -> Self {
        Self {
            receiver: Some(receiver),
        }
    }

    pub(crate) fn skipped() -> Self {
        Self { receiver: None }
    }

    /// True if the save was queued for the remote.
    pub fn is_queued(&self) -> bool {
        self.receiver.is_some()
    }

    /// Waits for the push to finish.
    pub async fn outcome(self) -> PushOutcome {
        match self.receiver {
            Some(receiver) => receiver
                .await
                .unwrap_or_else(|_| PushOutcome::Failed("push worker stopped".to_string())),
            None => PushOutcome::Skipped,
        }
    }
}
