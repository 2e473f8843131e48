//! Revision markers used to arbitrate between local and remote writes.
//!
//! A revision is a per-key counter plus the device that produced it. Local
//! writes advance the counter past anything this device has seen; applying a
//! remote write adopts the remote revision. Ordering never looks at wall
//! clocks, so skew between devices cannot reorder writes. The timestamp is
//! kept for display only.
//!
//! Arbitration is last-writer-wins: concurrent writes with equal counters from
//! different devices both count as "not older", and whichever arrives last is
//! kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{ChangeOrigin, LocalStore, StoreError};

/// Store key holding this device's identifier.
pub const DEVICE_ID_KEY: &str = "deviceId";

/// Identifier of one device (one local store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Loads the device ID from `store`, creating and saving one if missing.
    pub fn load_or_create(store: &LocalStore) -> Result<Self, StoreError> {
        match store.try_get::<DeviceId>(DEVICE_ID_KEY) {
            Ok(Some(id)) => return Ok(id),
            Ok(None) => {}
            Err(e) => tracing::warn!("Replacing unreadable device id: {}", e),
        }
        let id = Self::new();
        store.set(DEVICE_ID_KEY, &id)?;
        Ok(id)
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// Revision of the value stored under one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub counter: u64,
    pub device: DeviceId,
    pub written_at: DateTime<Utc>,
}

impl Revision {
    /// The revision following `previous` for a write made on `device`.
    pub fn next(previous: Option<&Revision>, device: DeviceId) -> Self {
        Self {
            counter: previous.map_or(1, |r| r.counter + 1),
            device,
            written_at: Utc::now(),
        }
    }

    /// True if both markers describe the same write.
    pub fn same_write(&self, other: &Revision) -> bool {
        self.counter == other.counter && self.device == other.device
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}@{}", self.counter, self.device)
    }
}

/// Outcome of comparing an incoming remote revision with the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// Remote is not older than local; apply it.
    Apply,
    /// Remote is the write we already hold (usually our own echo).
    AlreadyApplied,
    /// Remote is older than local; ignore it.
    Stale,
}

/// Decides whether a remote write should replace the local value.
pub fn arbitrate(local: Option<&Revision>, remote: &Revision) -> Arbitration {
    match local {
        None => Arbitration::Apply,
        Some(local) if local.same_write(remote) => Arbitration::AlreadyApplied,
        Some(local) if remote.counter >= local.counter => Arbitration::Apply,
        Some(_) => Arbitration::Stale,
    }
}

/// Store key holding the revision of `storage_key`.
pub fn revision_key(storage_key: &str) -> String {
    format!("{}@revision", storage_key)
}

/// Loads the revision of `storage_key`; unreadable markers count as absent.
pub fn load_revision(store: &LocalStore, storage_key: &str) -> Option<Revision> {
    match store.try_get(&revision_key(storage_key)) {
        Ok(revision) => revision,
        Err(e) => {
            tracing::warn!("Ignoring unreadable revision for '{}': {}", storage_key, e);
            None
        }
    }
}

pub fn save_revision(
    store: &LocalStore,
    storage_key: &str,
    revision: &Revision,
    origin: ChangeOrigin,
) -> Result<(), StoreError> {
    store.set_with_origin(&revision_key(storage_key), revision, origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(counter: u64, device: DeviceId) -> Revision {
        Revision {
            counter,
            device,
            written_at: Utc::now(),
        }
    }

    #[test]
    fn test_next_starts_at_one_and_advances() {
        let device = DeviceId::new();
        let first = Revision::next(None, device);
        assert_eq!(first.counter, 1);

        let second = Revision::next(Some(&first), device);
        assert_eq!(second.counter, 2);
    }

    #[test]
    fn test_arbitrate_without_local_applies() {
        assert_eq!(arbitrate(None, &rev(1, DeviceId::new())), Arbitration::Apply);
    }

    #[test]
    fn test_arbitrate_echo_is_already_applied() {
        let device = DeviceId::new();
        let local = rev(3, device);
        let echo = rev(3, device);
        assert_eq!(arbitrate(Some(&local), &echo), Arbitration::AlreadyApplied);
    }

    #[test]
    fn test_arbitrate_newer_and_concurrent_apply() {
        let local = rev(3, DeviceId::new());
        assert_eq!(
            arbitrate(Some(&local), &rev(4, DeviceId::new())),
            Arbitration::Apply
        );
        assert_eq!(
            arbitrate(Some(&local), &rev(3, DeviceId::new())),
            Arbitration::Apply
        );
    }

    #[test]
    fn test_arbitrate_older_is_stale() {
        let local = rev(5, DeviceId::new());
        assert_eq!(
            arbitrate(Some(&local), &rev(4, DeviceId::new())),
            Arbitration::Stale
        );
    }

    #[test]
    fn test_wall_clock_is_ignored() {
        let device = DeviceId::new();
        let local = rev(2, device);
        let mut remote = rev(3, DeviceId::new());
        remote.written_at = local.written_at - chrono::Duration::days(365);
        assert_eq!(arbitrate(Some(&local), &remote), Arbitration::Apply);
    }

    #[test]
    fn test_device_id_persists() {
        let store = LocalStore::in_memory();
        let first = DeviceId::load_or_create(&store).unwrap();
        let second = DeviceId::load_or_create(&store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_revision_storage_roundtrip() {
        let store = LocalStore::in_memory();
        assert!(load_revision(&store, "races").is_none());

        let revision = Revision::next(None, DeviceId::new());
        save_revision(&store, "races", &revision, ChangeOrigin::Local).unwrap();

        let loaded = load_revision(&store, "races").unwrap();
        assert!(loaded.same_write(&revision));
        assert!(store.contains("races@revision"));
    }
}
