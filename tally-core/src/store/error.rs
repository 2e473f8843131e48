//! Store error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during local store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error reading or writing a file.
    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),

    /// Key cannot be stored (empty or contains path separators).
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Stored value is not valid JSON for the requested type.
    #[error("Failed to parse value for key '{0}': {1}")]
    Parse(String, String),

    /// Value could not be serialized.
    #[error("Failed to serialize value for key '{0}': {1}")]
    Serialize(String, String),

    #[error("store lock was poisoned")]
    LockPoisoned,
}
