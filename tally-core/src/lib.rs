//! Tally Core Library
//!
//! Local stores, undo history and multi-device sync shared by the Tally
//! trackers.

pub mod action_log;
pub mod apps;
pub mod auth;
pub mod backup;
pub mod events;
pub mod record;
pub mod remote;
pub mod revision;
pub mod status;
pub mod store;
pub mod sync;

pub use action_log::{Action, ActionKind, ActionLog, ActionLogEntry, LogState, Step};
pub use apps::{
    AppError, AppStore, FootballMatch, GymData, HeadToHead, HeadToHeadRecord, PlayerNames, Race,
    RaceStats, RaceTracker, Workout,
};
pub use auth::{
    AuthErrorKind, AuthEvent, AuthProvider, AuthResult, AuthSession, FederatedProvider,
    LocalAuthProvider, ProviderError, User,
};
pub use backup::{AutoBackup, BackupError, ParsedBackup};
pub use events::EventBus;
pub use record::{resolve_id, DecodeError, Record, RecordId, RecordIdError};
pub use remote::{DirRemoteStore, DocPath, MemoryRemoteStore, RemoteDocument, RemoteError, RemoteStore};
pub use revision::{Arbitration, DeviceId, Revision};
pub use status::{ModalOutcome, ReloadReason, SessionFlags, StatusTracker, SyncModal, SyncStatus};
pub use store::{ChangeOrigin, LocalStore, StoreChange, StoreError, StoreEvent};
pub use sync::{
    AppRegistration, MergeOutcome, PushHandle, PushOutcome, SyncEngine, SyncError, SyncEvent,
    SyncSnapshot,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
