use clap::{Args, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use tally_core::backup::write_backup_file;
use tally_core::{AppError, GymData, HeadToHead, LocalStore, RaceTracker};

use super::CommandError;
use crate::context::AppContext;

/// Which tracker a backup belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum App {
    Races,
    Gym,
    Football,
}

impl App {
    /// File name prefix for backups of this tracker.
    pub fn file_prefix(self) -> &'static str {
        match self {
            App::Races => "mario-kart",
            App::Gym => "gym",
            App::Football => "football",
        }
    }

    fn export(self, ctx: &AppContext) -> Result<String, AppError> {
        match self {
            App::Races => ctx.races.export_backup(),
            App::Gym => ctx.gym.export_backup(),
            App::Football => ctx.football.export_backup(),
        }
    }

    fn import(self, ctx: &mut AppContext, text: &str) -> Result<usize, AppError> {
        match self {
            App::Races => ctx.races.import_backup(text),
            App::Gym => ctx.gym.import_backup(text),
            App::Football => ctx.football.import_backup(text),
        }
    }
}

#[derive(Args)]
pub struct BackupCommand {
    #[command(subcommand)]
    pub command: BackupSubcommand,
}

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// Write a backup file
    Export {
        #[arg(value_enum)]
        app: App,

        /// Directory for the backup file
        #[arg(long, short, default_value = ".")]
        dir: PathBuf,

        /// Print the backup instead of writing a file
        #[arg(long)]
        stdout: bool,
    },

    /// Replace a tracker's data with a backup file
    Import {
        #[arg(value_enum)]
        app: App,

        /// Backup file to read
        file: PathBuf,
    },
}

impl BackupCommand {
    pub fn run(&self, ctx: &mut AppContext) -> Result<(), CommandError> {
        match &self.command {
            BackupSubcommand::Export { app, dir, stdout } => {
                let contents = app.export(ctx)?;
                if *stdout {
                    println!("{}", contents);
                } else {
                    let path = write_backup_file(dir, app.file_prefix(), &contents)
                        .map_err(AppError::from)?;
                    println!("Wrote {}", path.display());
                }
            }
            BackupSubcommand::Import { app, file } => {
                let text = std::fs::read_to_string(file)
                    .map_err(|e| CommandError::Io(file.clone(), e))?;
                let count = app.import(ctx, &text)?;
                println!("Imported {} record(s) from {}", count, file.display());
            }
        }
        Ok(())
    }
}

/// Backs up every tracker from what is currently in `local`.
///
/// Reads the store rather than live trackers so a timer task can call it.
pub fn backup_all(local: &LocalStore, dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let exports = [
        (App::Races, RaceTracker::load_saved_data(local.clone()).export_backup()?),
        (App::Gym, GymData::load(local.clone()).export_backup()?),
        (App::Football, HeadToHead::load(local.clone()).export_backup()?),
    ];
    exports
        .iter()
        .map(|(app, contents)| Ok(write_backup_file(dir, app.file_prefix(), contents)?))
        .collect()
}
