//! Local key-value storage.
//!
//! Every tracker keeps its data as JSON values under string keys. A
//! [`LocalStore`] wraps a [`KeyValueBackend`] and publishes a [`StoreEvent`]
//! for each mutation so other components (the sync modal, the status line)
//! can observe writes without polling.
//!
//! # Storage Layout
//!
//! The file backend keeps one file per key:
//!
//! ```text
//! <data_dir>/
//! ├── marioKartRaces.json
//! ├── marioKartRaces@revision.json
//! ├── deviceId.json
//! └── auth.session.json
//! ```

mod backend;
mod error;
mod local;

pub use backend::{FileBackend, KeyValueBackend, MemoryBackend};
pub use error::StoreError;
pub use local::{ChangeOrigin, LocalStore, StoreChange, StoreEvent};
