//! Sync inspection commands.

use clap::{Args, Subcommand};

use super::{CommandError, OutputFormat};
use crate::config::Config;
use crate::context::AppContext;

/// Show sync state
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and registered trackers
    Status {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl SyncCommand {
    pub fn run(&self, ctx: &AppContext, config: &Config) -> Result<(), CommandError> {
        let format = match &self.command {
            Some(SyncSubcommand::Status { format }) => format.clone(),
            None => OutputFormat::Text,
        };

        let Some(engine) = &ctx.engine else {
            println!("Sync Configuration");
            println!("==================");
            println!();
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    remote_dir: /path/to/shared/folder");
            println!();
            println!("Or set environment variable:");
            println!("  TALLY_REMOTE_DIR");
            return Ok(());
        };

        let snapshot = engine.debug_snapshot();
        if let OutputFormat::Json = format {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            return Ok(());
        }

        println!("Sync Configuration");
        println!("==================");
        println!();
        if let Some(dir) = &config.sync.remote_dir {
            println!("Remote:  {}", dir.display());
        }
        println!("Device:  {}", snapshot.device);
        match &snapshot.user {
            Some(user) => println!("User:    {}", user.label()),
            None => println!("User:    not signed in"),
        }
        println!();

        if snapshot.namespaces.is_empty() {
            println!("No trackers registered.");
        }
        for ns in &snapshot.namespaces {
            let state = match (ns.listening, ns.merged) {
                (true, true) => "✓ listening",
                (true, false) => "… merging",
                (false, _) => "✗ idle",
            };
            let revision = ns
                .revision
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  {} {} ({}, revision {})", state, ns.namespace, ns.storage_key, revision);
        }
        Ok(())
    }
}
