//! Sync error types.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

/// Errors that can occur during sync engine operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Operation needs a signed-in user
    #[error("Not signed in")]
    NotSignedIn,

    /// No registration for the namespace
    #[error("App '{0}' is not registered for sync")]
    NotRegistered(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Collection value could not be converted to JSON
    #[error("Failed to serialize '{0}': {1}")]
    Serialize(String, String),

    #[error("sync engine lock was poisoned")]
    LockPoisoned,
}
