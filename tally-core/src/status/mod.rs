//! Sync feedback for the UI: the status line and the first-sign-in wait.

mod modal;
mod tracker;

pub use modal::{ModalOutcome, ReloadReason, SessionFlags, SyncModal, DEFAULT_MODAL_TIMEOUT};
pub use tracker::{StatusTracker, SyncStatus};
