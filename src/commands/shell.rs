//! Interactive session.
//!
//! One shell run is one session: undo history lives as long as the shell,
//! the sign-in wait is shown at most once, and the prompt follows the sync
//! status.

use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use tally_core::{
    AutoBackup, ModalOutcome, ReloadReason, SessionFlags, StatusTracker, SyncModal, SyncStatus,
};

use super::backup::backup_all;
use super::{
    AuthCommand, BackupCommand, CommandError, FootballCommand, RaceCommand, SyncCommand,
    WorkoutCommand,
};
use crate::config::Config;
use crate::context::AppContext;

/// Interactive session with undo/redo and live sync status
#[derive(Args)]
pub struct ShellCommand {}

#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    action: ShellAction,
}

#[derive(Subcommand)]
enum ShellAction {
    /// Sign up, sign in and out
    Auth(AuthCommand),
    /// Mario Kart races
    Race(RaceCommand),
    /// Gym workouts
    Workout(WorkoutCommand),
    /// Football head-to-head matches
    Football(FootballCommand),
    /// Export and import backups
    Backup(BackupCommand),
    /// Show sync state
    Sync(SyncCommand),
    /// Show the sync status and signed-in user
    Status,
    /// Re-read every tracker from the local store
    Reload,
    /// Leave the shell
    #[command(alias = "quit")]
    Exit,
}

impl ShellCommand {
    pub async fn run(&self, ctx: &mut AppContext, config: &Config) -> Result<(), CommandError> {
        let flags = Arc::new(SessionFlags::new());
        let modal = SyncModal::new(flags.clone()).with_timeout(config.sync.modal_timeout());

        let (status, status_task) = match &ctx.engine {
            Some(engine) => {
                let (rx, task) = StatusTracker::spawn(&ctx.session, engine);
                (Some(rx), Some(task))
            }
            None => (None, None),
        };
        let _auto_backup = start_auto_backup(ctx, config);
        let mut auth_events = ctx.session.subscribe();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("tally shell. Type 'help' for commands, 'exit' to quit.");
        loop {
            print!("tally [{}]> ", status_text(status.as_ref()));
            io::stdout()
                .flush()
                .map_err(|e| CommandError::Io("stdout".into(), e))?;

            let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| CommandError::Io("stdin".into(), e))?
            else {
                break;
            };
            let words = match split_words(&line) {
                Ok(words) if words.is_empty() => continue,
                Ok(words) => words,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    continue;
                }
            };
            let action = match ShellLine::try_parse_from(&words) {
                Ok(parsed) => parsed.action,
                Err(e) => {
                    eprintln!("{}", e);
                    continue;
                }
            };
            if let ShellAction::Exit = action {
                break;
            }

            // Subscribe before running so remote writes made by a sign-in are seen.
            let mut store_events = ctx.local.subscribe();
            if let Err(e) = dispatch(action, ctx, config, status.as_ref()).await {
                eprintln!("Error: {}", e);
            }

            while let Ok(event) = auth_events.try_recv() {
                if ctx.engine.is_none() {
                    continue;
                }
                if modal.should_show(&event) && !flags.modal_shown() {
                    println!("Syncing your data...");
                }
                if let ModalOutcome::Reload(reason) = modal.handle(&event, &mut store_events).await {
                    match reason {
                        ReloadReason::SyncObserved => println!("Data synced. Reloading."),
                        ReloadReason::TimedOut => println!("No remote data yet. Reloading."),
                    }
                    if let Err(e) = ctx.reload_all() {
                        eprintln!("Error: {}", e);
                    }
                }
            }
        }

        if let Some(task) = status_task {
            task.abort();
        }
        Ok(())
    }
}

async fn dispatch(
    action: ShellAction,
    ctx: &mut AppContext,
    config: &Config,
    status: Option<&watch::Receiver<SyncStatus>>,
) -> Result<(), CommandError> {
    match action {
        ShellAction::Auth(cmd) => cmd.run(ctx, false).await,
        ShellAction::Race(cmd) => cmd.run(ctx),
        ShellAction::Workout(cmd) => cmd.run(ctx),
        ShellAction::Football(cmd) => cmd.run(ctx),
        ShellAction::Backup(cmd) => cmd.run(ctx),
        ShellAction::Sync(cmd) => cmd.run(ctx, config),
        ShellAction::Status => {
            println!("{}", status_text(status));
            match ctx.session.current_user() {
                Some(user) => println!("Signed in as {}", user.label()),
                None => println!("Not signed in"),
            }
            Ok(())
        }
        ShellAction::Reload => {
            ctx.reload_all()?;
            println!("Reloaded. Undo history was cleared.");
            Ok(())
        }
        ShellAction::Exit => Ok(()),
    }
}

fn status_text(status: Option<&watch::Receiver<SyncStatus>>) -> String {
    match status {
        Some(rx) => rx.borrow().to_string(),
        None => "local".to_string(),
    }
}

fn start_auto_backup(ctx: &AppContext, config: &Config) -> Option<AutoBackup> {
    let dir = config.backup.dir.clone()?;
    let local = ctx.local.clone();
    let mut auto_backup = AutoBackup::new(config.backup.interval());
    auto_backup.start(move || match backup_all(&local, &dir) {
        Ok(paths) => tracing::info!("Auto-backup wrote {} file(s)", paths.len()),
        Err(e) => tracing::warn!("Auto-backup failed: {}", e),
    });
    Some(auto_backup)
}

/// Splits a command line on whitespace, honouring single and double quotes.
fn split_words(line: &str) -> Result<Vec<String>, CommandError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandError::InvalidInput("Unterminated quote".to_string()));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(
            split_words(r#"race add 1 2 --track "Rainbow Road""#).unwrap(),
            vec!["race", "add", "1", "2", "--track", "Rainbow Road"]
        );
        assert_eq!(split_words("  ").unwrap(), Vec::<String>::new());
        assert_eq!(split_words("names '' x").unwrap(), vec!["names", "", "x"]);
        assert!(split_words("race add 'oops").is_err());
    }

    #[test]
    fn test_shell_line_parses_tracker_commands() {
        let parsed = ShellLine::try_parse_from(["workout", "add", "Squat", "-s", "3", "-r", "5"]);
        assert!(matches!(parsed.unwrap().action, ShellAction::Workout(_)));

        let parsed = ShellLine::try_parse_from(["quit"]);
        assert!(matches!(parsed.unwrap().action, ShellAction::Exit));

        assert!(ShellLine::try_parse_from(["race", "add", "1"]).is_err());
    }
}
