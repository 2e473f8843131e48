//! JSON backups of app collections.
//!
//! A backup is one JSON object:
//!
//! ```json
//! {
//!   "races": [ ... ],
//!   "playerNames": { "player1": "Ana", "player2": "Ben" },
//!   "backupDate": "2024-05-01T10:00:00Z",
//!   "version": "1.0"
//! }
//! ```
//!
//! The primary collection array is required. Everything else is optional;
//! apps leave their state untouched for extras a file does not carry.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::record::{decode_records, DecodeError, Record};

pub const BACKUP_VERSION: &str = "1.0";

/// Date field written by most apps.
pub const BACKUP_DATE_FIELD: &str = "backupDate";
/// Date field written by the gym app.
pub const EXPORT_DATE_FIELD: &str = "exportDate";

/// Default interval between automatic backups.
pub const DEFAULT_AUTO_BACKUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Backup must be a JSON object")]
    NotAnObject,

    #[error("Backup has no '{0}' array")]
    MissingCollection(String),

    #[error("Backup {0}")]
    InvalidRecord(#[from] DecodeError),

    #[error("Backup field '{0}' is invalid: {1}")]
    InvalidField(String, String),

    #[error("Failed to serialize backup: {0}")]
    Serialize(String),

    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
}

/// Builds the backup document for `records` stored under `collection`.
pub fn export_backup<T: Serialize>(
    collection: &str,
    records: &[T],
    extras: Map<String, Value>,
    date_field: &str,
) -> Result<String, BackupError> {
    let records = serde_json::to_value(records).map_err(|e| BackupError::Serialize(e.to_string()))?;

    let mut doc = Map::new();
    doc.insert(collection.to_string(), records);
    doc.extend(extras);
    doc.insert(date_field.to_string(), Value::String(Utc::now().to_rfc3339()));
    doc.insert("version".to_string(), Value::String(BACKUP_VERSION.to_string()));

    serde_json::to_string_pretty(&Value::Object(doc)).map_err(|e| BackupError::Serialize(e.to_string()))
}

/// A validated backup.
#[derive(Debug, Clone)]
pub struct ParsedBackup<T> {
    pub records: Vec<T>,
    /// Every other top-level field except the date and version.
    pub extras: Map<String, Value>,
    pub backup_date: Option<String>,
    pub version: Option<String>,
}

impl<T> ParsedBackup<T> {
    /// Decodes an optional extra. `Ok(None)` if the file does not carry it.
    pub fn extra<E: DeserializeOwned>(&self, key: &str) -> Result<Option<E>, BackupError> {
        match self.extras.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| BackupError::InvalidField(key.to_string(), e.to_string())),
        }
    }
}

/// Validates `text` as a backup whose primary array is `collection`.
///
/// Nothing is partially accepted: any invalid record fails the whole parse.
pub fn parse_backup<T: Record>(text: &str, collection: &str) -> Result<ParsedBackup<T>, BackupError> {
    let value: Value = serde_json::from_str(text).map_err(|e| BackupError::InvalidJson(e.to_string()))?;
    let Value::Object(mut doc) = value else {
        return Err(BackupError::NotAnObject);
    };

    let records = match doc.remove(collection) {
        Some(Value::Array(items)) => decode_records(&items)?,
        _ => return Err(BackupError::MissingCollection(collection.to_string())),
    };

    let version = doc.remove("version").and_then(|v| v.as_str().map(str::to_string));
    if let Some(version) = &version {
        if version.split('.').next() != BACKUP_VERSION.split('.').next() {
            tracing::warn!("Importing backup version {} (expected {})", version, BACKUP_VERSION);
        }
    }
    let backup_date = [BACKUP_DATE_FIELD, EXPORT_DATE_FIELD]
        .iter()
        .filter_map(|field| doc.remove(*field))
        .find_map(|v| v.as_str().map(str::to_string));

    Ok(ParsedBackup {
        records,
        extras: doc,
        backup_date,
        version,
    })
}

/// Writes `contents` to `<dir>/<prefix>-backup-<timestamp>.json`.
pub fn write_backup_file(dir: &Path, prefix: &str, contents: &str) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(dir).map_err(|e| BackupError::Io(dir.to_path_buf(), e))?;
    let name = format!("{}-backup-{}.json", prefix, Utc::now().format("%Y-%m-%d-%H%M%S"));
    let path = dir.join(name);
    fs::write(&path, contents).map_err(|e| BackupError::Io(path.clone(), e))?;
    tracing::info!("Wrote backup {}", path.display());
    Ok(path)
}

/// Runs a backup job on a fixed interval.
///
/// Starting again replaces the running timer, so re-initializing never
/// leaves two timers behind. The timer stops when this value is dropped.
#[derive(Debug)]
pub struct AutoBackup {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl AutoBackup {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts (or restarts) the timer. The first run happens one interval from now.
    pub fn start<F>(&mut self, mut job: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.stop();
        let period = self.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                job();
            }
        }));
        tracing::debug!("Auto-backup every {:?}", period);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for AutoBackup {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Item {
        #[serde(default)]
        id: RecordId,
        name: String,
    }

    impl Record for Item {
        fn id(&self) -> RecordId {
            self.id
        }
    }

    #[test]
    fn test_export_then_parse() {
        let items = vec![Item {
            id: RecordId::new(),
            name: "a".into(),
        }];
        let mut extras = Map::new();
        extras.insert("players".into(), json!({"player1": "Ana"}));

        let text = export_backup("items", &items, extras, BACKUP_DATE_FIELD).unwrap();
        let parsed: ParsedBackup<Item> = parse_backup(&text, "items").unwrap();

        assert_eq!(parsed.records, items);
        assert_eq!(parsed.version.as_deref(), Some(BACKUP_VERSION));
        assert!(parsed.backup_date.is_some());
        assert!(parsed.extras.contains_key("players"));
        assert!(!parsed.extras.contains_key(BACKUP_DATE_FIELD));
    }

    #[test]
    fn test_rejects_missing_collection() {
        let result = parse_backup::<Item>(r#"{"other": []}"#, "items");
        assert!(matches!(result, Err(BackupError::MissingCollection(c)) if c == "items"));

        let result = parse_backup::<Item>(r#"{"items": {}}"#, "items");
        assert!(matches!(result, Err(BackupError::MissingCollection(_))));
    }

    #[test]
    fn test_rejects_non_json_and_non_object() {
        assert!(matches!(
            parse_backup::<Item>("not json", "items"),
            Err(BackupError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_backup::<Item>("[1, 2]", "items"),
            Err(BackupError::NotAnObject)
        ));
    }

    #[test]
    fn test_one_bad_record_fails_everything() {
        let text = r#"{"items": [{"name": "ok"}, {"name": "bad", "extra": 1}]}"#;
        match parse_backup::<Item>(text, "items") {
            Err(BackupError::InvalidRecord(e)) => assert_eq!(e.index, 1),
            other => panic!("expected invalid record, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_repeated_ids() {
        let id = RecordId::new();
        let text = format!(r#"{{"items": [{{"id": "{id}", "name": "a"}}, {{"id": "{id}", "name": "b"}}]}}"#);
        match parse_backup::<Item>(&text, "items") {
            Err(BackupError::InvalidRecord(e)) => assert_eq!(e.index, 1),
            other => panic!("expected duplicate id error, got {:?}", other),
        }
    }

    #[test]
    fn test_records_without_id_get_one() {
        let parsed: ParsedBackup<Item> = parse_backup(r#"{"items": [{"name": "a"}, {"name": "b"}]}"#, "items").unwrap();
        assert_ne!(parsed.records[0].id, parsed.records[1].id);
    }

    #[test]
    fn test_extra_missing_or_invalid() {
        let parsed: ParsedBackup<Item> =
            parse_backup(r#"{"items": [], "players": 5}"#, "items").unwrap();
        assert!(parsed.extra::<Map<String, Value>>("absent").unwrap().is_none());
        assert!(matches!(
            parsed.extra::<Map<String, Value>>("players"),
            Err(BackupError::InvalidField(_, _))
        ));
    }

    #[test]
    fn test_write_backup_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_backup_file(&temp_dir.path().join("backups"), "gym", "{}").unwrap();

        assert!(path.exists());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("gym-backup-"));
        assert!(name.ends_with(".json"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_backup_runs_on_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut auto = AutoBackup::new(Duration::from_secs(600));
        auto.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(1500)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(auto.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_timer() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut auto = AutoBackup::new(Duration::from_secs(600));

        let counter = first.clone();
        auto.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        auto.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(700)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        auto.stop();
        assert!(!auto.is_running());
    }
}
