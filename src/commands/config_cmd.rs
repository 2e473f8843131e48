use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# tally configuration

# Directory for local data (default: platform data dir + /tally)
# data_dir: ~/.local/share/tally

# Undo history length per tracker
undo_limit: 50

sync:
  # Shared folder that every device can reach; sync is off when unset
  # remote_dir: ~/Dropbox/tally
  auto_sync: true
  # Seconds to wait for remote data after signing in
  modal_timeout_secs: 10

backup:
  # Directory for automatic backups while the shell runs
  # dir: ~/tally-backups
  interval_minutes: 10
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("data_dir: {}", config.data_dir.value.display());
                        println!("  source: {}", config.data_dir.source);
                        println!();

                        println!("undo_limit: {}", config.undo_limit.value);
                        println!("  source: {}", config.undo_limit.source);
                        println!();

                        match &config.sync.remote_dir {
                            Some(dir) => println!("sync.remote_dir: {}", dir.display()),
                            None => println!("sync.remote_dir: (not set)"),
                        }
                        println!("sync.auto_sync: {}", config.sync.auto_sync);
                        println!("sync.modal_timeout_secs: {}", config.sync.modal_timeout_secs);
                        println!();

                        match &config.backup.dir {
                            Some(dir) => println!("backup.dir: {}", dir.display()),
                            None => println!("backup.dir: (not set)"),
                        }
                        println!("backup.interval_minutes: {}", config.backup.interval_minutes);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'tally config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                println!("\nEdit this file to customize your settings.");
                Ok(())
            }
        }
    }
}
