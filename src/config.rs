use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Shared directory holding the remote documents (e.g. a synced folder)
    pub remote_dir: Option<PathBuf>,
    /// Register the trackers with the sync engine when a user is signed in
    pub auto_sync: bool,
    /// How long the post sign-in wait lasts before reloading anyway
    pub modal_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_dir: None,
            auto_sync: true,
            modal_timeout_secs: 10,
        }
    }
}

impl SyncConfig {
    /// Returns true if a remote directory is configured
    pub fn is_configured(&self) -> bool {
        self.remote_dir.is_some()
    }

    pub fn modal_timeout(&self) -> Duration {
        Duration::from_secs(self.modal_timeout_secs)
    }
}

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory for automatic backups; auto-backup is off when unset
    pub dir: Option<PathBuf>,
    /// Minutes between automatic backups
    pub interval_minutes: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            interval_minutes: 10,
        }
    }
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local store
    pub data_dir: ConfigValue<PathBuf>,
    /// Undo history length per tracker
    pub undo_limit: ConfigValue<usize>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
    /// Backup configuration
    pub backup: BackupConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    undo_limit: Option<usize>,
    sync: Option<SyncConfig>,
    backup: Option<BackupConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut undo_limit = ConfigValue::new(
            tally_core::action_log::DEFAULT_CAPACITY,
            ConfigSource::Default,
        );
        let mut config_file = None;
        let mut sync = SyncConfig::default();
        let mut backup = BackupConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                data_dir = ConfigValue::new(resolve_relative(&path, dir), ConfigSource::File);
            }
            if let Some(limit) = file_config.undo_limit {
                undo_limit = ConfigValue::new(limit, ConfigSource::File);
            }
            if let Some(mut sync_config) = file_config.sync {
                sync_config.remote_dir = sync_config
                    .remote_dir
                    .map(|dir| resolve_relative(&path, dir));
                sync = sync_config;
            }
            if let Some(mut backup_config) = file_config.backup {
                backup_config.dir = backup_config.dir.map(|dir| resolve_relative(&path, dir));
                backup = backup_config;
            }
        }

        if let Ok(dir) = std::env::var("TALLY_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(limit) = std::env::var("TALLY_UNDO_LIMIT") {
            let parsed = limit
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("TALLY_UNDO_LIMIT".to_string(), limit))?;
            undo_limit = ConfigValue::new(parsed, ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("TALLY_REMOTE_DIR") {
            sync.remote_dir = Some(PathBuf::from(dir));
        }

        Ok(Self {
            data_dir,
            undo_limit,
            config_file,
            sync,
            backup,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/tally/
    /// - macOS: ~/Library/Application Support/tally/
    /// - Windows: %APPDATA%/tally/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/tally/
    /// - macOS: ~/Library/Application Support/tally/
    /// - Windows: %APPDATA%/tally/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolve relative paths against the config file's directory
fn resolve_relative(config_path: &Path, dir: PathBuf) -> PathBuf {
    if dir.is_relative() {
        config_path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
    } else {
        dir
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv(name, value) => {
                write!(f, "Invalid value '{}' for {}", value, name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.data_dir.value.ends_with("tally"));
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.undo_limit.value, 50);
        assert_eq!(config.undo_limit.source, ConfigSource::Default);
        assert!(config.sync.auto_sync);
        assert_eq!(config.sync.modal_timeout(), Duration::from_secs(10));
        assert!(config.backup.dir.is_none());
        assert_eq!(config.backup.interval(), Duration::from_secs(600));
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: /custom/tally").unwrap();
        writeln!(file, "undo_limit: 20").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  remote_dir: /shared/tally").unwrap();
        writeln!(file, "  modal_timeout_secs: 3").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.data_dir.value, PathBuf::from("/custom/tally"));
        assert_eq!(config.data_dir.source, ConfigSource::File);
        assert_eq!(config.undo_limit.value, 20);
        assert_eq!(config.undo_limit.source, ConfigSource::File);
        assert_eq!(config.sync.remote_dir, Some(PathBuf::from("/shared/tally")));
        assert_eq!(config.sync.modal_timeout_secs, 3);
        // Unspecified sync fields keep their defaults
        assert!(config.sync.auto_sync);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "data_dir: data").unwrap();
        writeln!(file, "backup:").unwrap();
        writeln!(file, "  dir: backups").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.value, temp_dir.path().join("data"));
        assert_eq!(config.backup.dir, Some(temp_dir.path().join("backups")));
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "undo_limit: 10").unwrap();

        std::env::set_var("TALLY_UNDO_LIMIT", "5");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.undo_limit.value, 5);
        assert_eq!(config.undo_limit.source, ConfigSource::Environment);

        std::env::remove_var("TALLY_UNDO_LIMIT");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_partial_file_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "undo_limit: 7").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.data_dir.source, ConfigSource::Default);
        assert_eq!(config.undo_limit.value, 7);
        assert!(!config.sync.is_configured());
    }
}
