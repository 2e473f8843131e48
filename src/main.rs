use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod context;

use commands::{
    AuthCommand, BackupCommand, ConfigCommand, FootballCommand, RaceCommand, ShellCommand,
    SyncCommand, WorkoutCommand,
};
use config::Config;
use context::AppContext;

#[derive(Parser)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Local-first trackers for races, workouts and football matches", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
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

    /// Manage configuration
    Config(ConfigCommand),

    /// Interactive session with undo/redo and live sync status
    Shell(ShellCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=warn,tally_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => return cmd.run(&config, cli_config_path),
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(execute_command(command, &config))
}

async fn execute_command(
    command: Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = AppContext::open(config).await?;

    let result = match &command {
        Commands::Auth(cmd) => cmd.run(&mut ctx, true).await,
        Commands::Race(cmd) => cmd.run(&mut ctx),
        Commands::Workout(cmd) => cmd.run(&mut ctx),
        Commands::Football(cmd) => cmd.run(&mut ctx),
        Commands::Backup(cmd) => cmd.run(&mut ctx),
        Commands::Sync(cmd) => cmd.run(&ctx, config),
        Commands::Shell(cmd) => cmd.run(&mut ctx, config).await,
        Commands::Config(_) => Ok(()),
    };

    // Pushes are queued behind local writes; wait for them before exiting.
    ctx.finish().await;

    result.map_err(Into::into)
}
