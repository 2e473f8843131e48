//! Explicit per-app collection store.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::action_log::{Action, ActionLog, Step};
use crate::backup::BackupError;
use crate::record::{position_of, Record, RecordId};
use crate::store::{LocalStore, StoreError};
use crate::sync::{AppRegistration, PushHandle, PushOutcome, SyncEngine, SyncError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No record with id {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("app store lock was poisoned")]
    LockPoisoned,
}

/// One app's collection: in-memory records, the undo log and persistence.
///
/// Every mutation rewrites the whole collection once. When sync is enabled
/// the write goes through the [`SyncEngine`], which also queues exactly one
/// push; [`flush`](AppStore::flush) waits for queued pushes.
#[derive(Debug)]
pub struct AppStore<T: Record> {
    namespace: String,
    storage_key: String,
    local: LocalStore,
    records: Arc<Mutex<Vec<T>>>,
    log: ActionLog<T>,
    sync: Option<SyncEngine>,
    pending: Vec<PushHandle>,
}

impl<T: Record + PartialEq> AppStore<T> {
    /// Loads `storage_key` from `local`; missing or corrupt data gives an
    /// empty collection.
    pub fn load(local: LocalStore, namespace: &str, storage_key: &str) -> Self {
        let records: Vec<T> = local.get(storage_key);
        tracing::debug!("Loaded {} record(s) from '{}'", records.len(), storage_key);
        Self {
            namespace: namespace.to_string(),
            storage_key: storage_key.to_string(),
            local,
            records: Arc::new(Mutex::new(records)),
            log: ActionLog::new(),
            sync: None,
            pending: Vec::new(),
        }
    }

    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.log = ActionLog::with_capacity(limit);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Registers the collection with `engine`.
    ///
    /// Remote updates replace the in-memory records. Undo entries that refer
    /// to records the update removed are skipped when undone.
    pub async fn enable_sync(&mut self, engine: &SyncEngine) -> Result<(), AppError> {
        let records = self.records.clone();
        let local = self.local.clone();
        let key = self.storage_key.clone();
        let registration = AppRegistration::new(&self.storage_key, &self.namespace).on_update(move |_| {
            let mut current = match records.lock() {
                Ok(current) => current,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Read the store under the records lock: a local save may have
            // committed a newer revision since this update was written.
            match local.try_get::<Vec<T>>(&key) {
                Ok(Some(stored)) => *current = stored,
                Ok(None) => current.clear(),
                Err(e) => tracing::warn!("Ignoring undecodable remote data for '{}': {}", key, e),
            }
        });
        self.sync = Some(engine.clone());
        engine.register_app(&self.namespace, registration).await?;
        Ok(())
    }

    pub fn is_synced(&self) -> bool {
        self.sync.is_some()
    }

    pub fn records(&self) -> Vec<T> {
        self.lock_or_recover().clone()
    }

    pub fn get(&self, id: RecordId) -> Option<T> {
        self.lock_or_recover().iter().find(|r| r.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_or_recover().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_or_recover().is_empty()
    }

    pub fn log(&self) -> &ActionLog<T> {
        &self.log
    }

    pub fn add(&mut self, record: T) -> Result<(), AppError> {
        let mut records = lock_records(&self.records)?;
        records.push(record.clone());
        let handle = match self.persist(&records) {
            Ok(handle) => handle,
            Err(e) => {
                records.pop();
                return Err(e);
            }
        };
        drop(records);
        self.log.record(Action::Add { record });
        self.track(handle);
        Ok(())
    }

    /// Replaces the record with the same id. Returns the previous version.
    pub fn edit(&mut self, record: T) -> Result<T, AppError> {
        let mut records = lock_records(&self.records)?;
        let index = position_of(&records, record.id())
            .ok_or_else(|| AppError::NotFound(record.id().to_string()))?;
        let previous = std::mem::replace(&mut records[index], record.clone());
        if previous == record {
            return Ok(previous);
        }
        let handle = match self.persist(&records) {
            Ok(handle) => handle,
            Err(e) => {
                records[index] = previous;
                return Err(e);
            }
        };
        drop(records);
        self.log.record(Action::Edit {
            previous: previous.clone(),
            current: record,
        });
        self.track(handle);
        Ok(previous)
    }

    pub fn delete(&mut self, id: RecordId) -> Result<T, AppError> {
        let mut records = lock_records(&self.records)?;
        let index = position_of(&records, id).ok_or_else(|| AppError::NotFound(id.to_string()))?;
        let record = records.remove(index);
        let handle = match self.persist(&records) {
            Ok(handle) => handle,
            Err(e) => {
                records.insert(index, record);
                return Err(e);
            }
        };
        drop(records);
        self.log.record(Action::Delete {
            record: record.clone(),
            index,
        });
        self.track(handle);
        Ok(record)
    }

    /// Reverts the newest action. `Ok(None)` if there is nothing to undo.
    ///
    /// If the result cannot be saved, the records and the log are put back
    /// as they were.
    pub fn undo(&mut self) -> Result<Option<Step>, AppError> {
        let mut records = lock_records(&self.records)?;
        let before = records.clone();
        let state = self.log.state();
        let step = self.log.undo(&mut records);
        let handle = match step {
            Some(Step { applied: true, .. }) => match self.persist(&records) {
                Ok(handle) => handle,
                Err(e) => {
                    *records = before;
                    self.log.rollback_undo(state);
                    return Err(e);
                }
            },
            _ => None,
        };
        drop(records);
        self.track(handle);
        Ok(step)
    }

    pub fn redo(&mut self) -> Result<Option<Step>, AppError> {
        let mut records = lock_records(&self.records)?;
        let before = records.clone();
        let state = self.log.state();
        let step = self.log.redo(&mut records);
        let handle = match step {
            Some(Step { applied: true, .. }) => match self.persist(&records) {
                Ok(handle) => handle,
                Err(e) => {
                    *records = before;
                    self.log.rollback_redo(state);
                    return Err(e);
                }
            },
            _ => None,
        };
        drop(records);
        self.track(handle);
        Ok(step)
    }

    /// Replaces the whole collection (imports) and clears the undo history.
    pub fn replace_all(&mut self, incoming: Vec<T>) -> Result<(), AppError> {
        let mut records = lock_records(&self.records)?;
        let handle = self.persist(&incoming)?;
        *records = incoming;
        drop(records);
        self.log.clear();
        self.track(handle);
        Ok(())
    }

    /// Re-reads the collection from the local store, starting a fresh undo
    /// history.
    pub fn reload(&mut self) -> Result<(), AppError> {
        let fresh: Vec<T> = self.local.get(&self.storage_key);
        *lock_records(&self.records)? = fresh;
        self.log.clear();
        Ok(())
    }

    /// Waits for every queued push and returns their outcomes.
    pub async fn flush(&mut self) -> Vec<PushOutcome> {
        let pending = std::mem::take(&mut self.pending);
        let mut outcomes = Vec::with_capacity(pending.len());
        for handle in pending {
            outcomes.push(handle.outcome().await);
        }
        outcomes
    }

    fn persist(&self, records: &[T]) -> Result<Option<PushHandle>, AppError> {
        match &self.sync {
            Some(engine) => match engine.save_app_data(&self.namespace, records) {
                Ok(handle) => Ok(Some(handle)),
                // Sign-out drops registrations; keep saving locally until re-enabled.
                Err(SyncError::NotRegistered(_)) => {
                    tracing::debug!("'{}' is not registered; saving locally", self.namespace);
                    self.local.set(&self.storage_key, records)?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            },
            None => {
                self.local.set(&self.storage_key, records)?;
                Ok(None)
            }
        }
    }

    fn track(&mut self, handle: Option<PushHandle>) {
        if let Some(handle) = handle.filter(PushHandle::is_queued) {
            self.pending.push(handle);
        }
    }

    fn lock_or_recover(&self) -> MutexGuard<'_, Vec<T>> {
        match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Locks only the records field so the undo log stays mutably borrowable.
fn lock_records<T>(records: &Mutex<Vec<T>>) -> Result<MutexGuard<'_, Vec<T>>, AppError> {
    records.lock().map_err(|_| AppError::LockPoisoned)
}
