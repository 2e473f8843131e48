//! Record identity shared by every tracker.
//!
//! Records are identified by a generated [`RecordId`] rather than by their
//! position in a collection, so edits and deletes keep targeting the right
//! record after the collection is filtered, reordered or replaced by a sync.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when parsing record identifiers.
#[derive(Error, Debug)]
pub enum RecordIdError {
    #[error("Invalid record ID '{0}': {1}")]
    Invalid(String, String),
}

/// Stable identifier of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Short prefix used when listing records on a terminal.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    /// Parse a full UUID string.
    pub fn parse(s: &str) -> Result<Self, RecordIdError> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| RecordIdError::Invalid(s.to_string(), e.to_string()))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = RecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A record kept by one of the trackers.
///
/// Implementors are plain serde structs; they should deny unknown fields so
/// that a foreign or corrupted shape is rejected instead of half-decoded.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> RecordId;
}

/// Returns the position of the record with `id`.
pub fn position_of<T: Record>(records: &[T], id: RecordId) -> Option<usize> {
    records.iter().position(|r| r.id() == id)
}

/// Resolves a user-supplied id or id prefix against a collection.
///
/// Returns `None` when nothing matches or the prefix is ambiguous.
pub fn resolve_id<T: Record>(records: &[T], query: &str) -> Option<RecordId> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    if let Ok(id) = RecordId::parse(&query) {
        return position_of(records, id).map(|_| id);
    }

    let mut matches = records
        .iter()
        .map(Record::id)
        .filter(|id| id.as_uuid().simple().to_string().starts_with(&query));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Some(id),
        _ => None,
    }
}

/// Decodes a JSON array into records, failing on the first invalid entry.
///
/// An id that appears twice is invalid too.
pub fn decode_records<T: Record>(values: &[serde_json::Value]) -> Result<Vec<T>, DecodeError> {
    let mut seen = HashSet::with_capacity(values.len());
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let record: T = serde_json::from_value(value.clone()).map_err(|e| DecodeError {
            index,
            reason: e.to_string(),
        })?;
        if !seen.insert(record.id()) {
            return Err(DecodeError {
                index,
                reason: format!("duplicate id {}", record.id()),
            });
        }
        records.push(record);
    }
    Ok(records)
}

/// A record that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("record {index} is invalid: {reason}")]
pub struct DecodeError {
    pub index: usize,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Note {
        #[serde(default)]
        id: RecordId,
        text: String,
    }

    impl Record for Note {
        fn id(&self) -> RecordId {
            self.id
        }
    }

    fn note(text: &str) -> Note {
        Note {
            id: RecordId::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_new_record_ids_differ() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_parse_and_display() {
        let id = RecordId::new();
        let parsed: RecordId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(RecordId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_short_is_prefix() {
        let id = RecordId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.as_uuid().simple().to_string().starts_with(&id.short()));
    }

    #[test]
    fn test_resolve_id_by_prefix() {
        let notes = vec![note("a"), note("b")];
        let target = notes[1].id;
        assert_eq!(resolve_id(&notes, &target.short()), Some(target));
        assert_eq!(resolve_id(&notes, &target.to_string()), Some(target));
        assert_eq!(resolve_id(&notes, ""), None);
        assert_eq!(resolve_id(&notes, &RecordId::new().to_string()), None);
    }

    #[test]
    fn test_decode_records_generates_missing_ids() {
        let values = vec![json!({"text": "hello"})];
        let decoded: Vec<Note> = decode_records(&values).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].text, "hello");
    }

    #[test]
    fn test_decode_records_fails_closed() {
        let values = vec![
            json!({"text": "ok"}),
            json!({"text": "bad", "colour": "red"}),
        ];
        let err = decode_records::<Note>(&values).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_decode_records_rejects_repeated_id() {
        let id = RecordId::new();
        let values = vec![json!({"id": id, "text": "a"}), json!({"id": id, "text": "b"})];
        let err = decode_records::<Note>(&values).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.reason.contains("duplicate"));
    }
}
