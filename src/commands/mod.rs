mod auth;
mod backup;
mod config_cmd;
mod football;
mod race;
mod shell;
mod sync_cmd;
mod workout;

pub use auth::AuthCommand;
pub use backup::BackupCommand;
pub use config_cmd::ConfigCommand;
pub use football::FootballCommand;
pub use race::RaceCommand;
pub use shell::ShellCommand;
pub use sync_cmd::SyncCommand;
pub use workout::WorkoutCommand;

use chrono::{Local, NaiveDate};
use clap::ValueEnum;
use std::path::PathBuf;

use tally_core::{resolve_id, AppError, Record, RecordId, Step, SyncError};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Errors surfaced by CLI commands
#[derive(Debug)]
pub enum CommandError {
    /// A tracker rejected the operation
    App(AppError),
    /// The sync engine could not be created
    Sync(SyncError),
    /// Sign-in or sign-up failed; holds the user-facing message
    Auth(String),
    /// Bad command-line input
    InvalidInput(String),
    /// Reading or writing a file failed
    Io(PathBuf, std::io::Error),
    /// JSON output could not be rendered
    Json(serde_json::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::App(e) => write!(f, "{}", e),
            CommandError::Sync(e) => write!(f, "Sync error: {}", e),
            CommandError::Auth(message) => write!(f, "{}", message),
            CommandError::InvalidInput(message) => write!(f, "{}", message),
            CommandError::Io(path, e) => write!(f, "Failed to access '{}': {}", path.display(), e),
            CommandError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<AppError> for CommandError {
    fn from(e: AppError) -> Self {
        CommandError::App(e)
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::Sync(e)
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError::Json(e)
    }
}

/// Parses a YYYY-MM-DD date, defaulting to today.
pub(crate) fn parse_date(date: Option<&str>) -> Result<NaiveDate, CommandError> {
    match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| {
            CommandError::InvalidInput(format!("Invalid date format '{}'. Use YYYY-MM-DD.", d))
        }),
        None => Ok(Local::now().date_naive()),
    }
}

/// Resolves a full id or unambiguous id prefix.
pub(crate) fn find_id<T: Record>(records: &[T], query: &str) -> Result<RecordId, CommandError> {
    resolve_id(records, query).ok_or_else(|| {
        CommandError::InvalidInput(format!("No single record matches '{}'", query))
    })
}

pub(crate) fn print_step(step: Option<Step>, verb: &str) {
    match step {
        Some(step) if step.applied => println!("{} {}", verb, step.kind),
        Some(step) => println!(
            "{} {} (record no longer present, nothing changed)",
            verb, step.kind
        ),
        None => println!("Nothing to {}", verb.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Race;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("2024-02-29")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date(Some("29/02/2024")).is_err());
        assert_eq!(parse_date(None).unwrap(), Local::now().date_naive());
    }

    #[test]
    fn test_find_id_by_prefix() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let races = vec![Race::new(date, 1, 2), Race::new(date, 2, 1)];
        let prefix = races[1].id.short();

        assert_eq!(find_id(&races, &prefix).unwrap(), races[1].id);
        assert!(find_id(&races, "zzzz").is_err());
    }
}
