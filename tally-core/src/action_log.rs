//! Session-local undo/redo history.
//!
//! The log is linear: recording a new action after an undo discards the redo
//! stack. It is bounded, keeps only the most recent entries, and is never
//! persisted or synced.
//!
//! Every entry carries enough data to build its own inverse:
//!
//! | Action | Forward               | Inverse                          |
//! |--------|-----------------------|----------------------------------|
//! | Add    | append record         | delete by id                     |
//! | Delete | delete by id          | insert at original index         |
//!
//! Re-inserting never duplicates an id: if a sync already brought the record
//! back, the step reports that it was not applied.
//! | Edit   | replace with current  | replace with previous snapshot   |

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::record::{position_of, Record};

/// Number of entries kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Add,
    Edit,
    Delete,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Add => write!(f, "add"),
            ActionKind::Edit => write!(f, "edit"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

/// A mutating user action with the payload needed to invert it.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<T> {
    Add { record: T },
    /// Full snapshots on both sides so repeated undo/redo cannot drift.
    Edit { previous: T, current: T },
    Delete { record: T, index: usize },
}

impl<T: Record> Action<T> {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Add { .. } => ActionKind::Add,
            Action::Edit { .. } => ActionKind::Edit,
            Action::Delete { .. } => ActionKind::Delete,
        }
    }

    /// Applies the action to `records`. Returns false if the target is gone.
    pub fn apply(&self, records: &mut Vec<T>) -> bool {
        match self {
            Action::Add { record } => {
                if position_of(records, record.id()).is_some() {
                    return false;
                }
                records.push(record.clone());
                true
            }
            Action::Edit { current, .. } => replace(records, current),
            Action::Delete { record, .. } => remove(records, record),
        }
    }

    /// Applies the inverse of the action to `records`.
    pub fn revert(&self, records: &mut Vec<T>) -> bool {
        match self {
            Action::Add { record } => remove(records, record),
            Action::Edit { previous, .. } => replace(records, previous),
            Action::Delete { record, index } => {
                if position_of(records, record.id()).is_some() {
                    return false;
                }
                let at = (*index).min(records.len());
                records.insert(at, record.clone());
                true
            }
        }
    }
}

fn replace<T: Record>(records: &mut [T], record: &T) -> bool {
    match position_of(records, record.id()) {
        Some(i) => {
            records[i] = record.clone();
            true
        }
        None => false,
    }
}

fn remove<T: Record>(records: &mut Vec<T>, record: &T) -> bool {
    match position_of(records, record.id()) {
        Some(i) => {
            records.remove(i);
            true
        }
        None => false,
    }
}

/// One recorded action.
#[derive(Debug, Clone)]
pub struct ActionLogEntry<T> {
    pub action: Action<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Record> ActionLogEntry<T> {
    pub fn new(action: Action<T>) -> Self {
        Self {
            action,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

/// Where the log is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Idle,
    Logged,
    Undone,
    Redone,
}

/// Result of an undo or redo step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub kind: ActionKind,
    /// False when the target record no longer existed.
    pub applied: bool,
}

/// Bounded linear undo/redo history.
#[derive(Debug, Clone)]
pub struct ActionLog<T> {
    history: VecDeque<ActionLogEntry<T>>,
    redo: Vec<ActionLogEntry<T>>,
    capacity: usize,
    state: LogState,
}

impl<T: Record> ActionLog<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::new(),
            redo: Vec::new(),
            capacity: capacity.max(1),
            state: LogState::Idle,
        }
    }

    /// Appends an action and truncates the redo history.
    pub fn record(&mut self, action: Action<T>) {
        self.push_history(ActionLogEntry::new(action));
        self.redo.clear();
        self.state = LogState::Logged;
    }

    /// Reverts the newest action on `records`. `None` if there is nothing to undo.
    pub fn undo(&mut self, records: &mut Vec<T>) -> Option<Step> {
        let entry = self.history.pop_back()?;
        let applied = entry.action.revert(records);
        if !applied {
            tracing::debug!("Undo target for {} is gone; step consumed", entry.kind());
        }
        let step = Step {
            kind: entry.kind(),
            applied,
        };
        self.redo.push(entry);
        self.state = LogState::Undone;
        Some(step)
    }

    /// Re-applies the most recently undone action. `None` if the redo stack is empty.
    pub fn redo(&mut self, records: &mut Vec<T>) -> Option<Step> {
        let entry = self.redo.pop()?;
        let applied = entry.action.apply(records);
        let step = Step {
            kind: entry.kind(),
            applied,
        };
        self.push_history(entry);
        self.state = LogState::Redone;
        Some(step)
    }

    /// Moves the last undone entry back onto the undo stack, restoring
    /// `state`. Records are left alone; the caller restores them.
    pub fn rollback_undo(&mut self, state: LogState) {
        if let Some(entry) = self.redo.pop() {
            self.history.push_back(entry);
            self.state = state;
        }
    }

    /// Moves the last redone entry back onto the redo stack, restoring `state`.
    pub fn rollback_redo(&mut self, state: LogState) {
        if let Some(entry) = self.history.pop_back() {
            self.redo.push(entry);
            self.state = state;
        }
    }

    fn push_history(&mut self, entry: ActionLogEntry<T>) {
        self.history.push_back(entry);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Number of undoable entries.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    /// Newest entry first.
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry<T>> {
        self.history.iter().rev()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.redo.clear();
        self.state = LogState::Idle;
    }
}

impl<T: Record> Default for ActionLog<T> {
    fn default() -> Self {
        Self::new()
    }
}
