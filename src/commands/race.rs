use clap::{Args, Subcommand};

use tally_core::{Race, RaceTracker};

use super::{find_id, parse_date, print_step, CommandError, OutputFormat};
use crate::context::AppContext;

#[derive(Args)]
pub struct RaceCommand {
    #[command(subcommand)]
    pub command: RaceSubcommand,
}

#[derive(Subcommand)]
pub enum RaceSubcommand {
    /// Record a race
    Add {
        /// Finishing position of player 1 (1-12)
        player1: u8,

        /// Finishing position of player 2 (1-12)
        player2: u8,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Track name
        #[arg(long, short)]
        track: Option<String>,
    },

    /// Change a recorded race
    Edit {
        /// Race ID or ID prefix
        id: String,

        #[arg(long)]
        player1: Option<u8>,

        #[arg(long)]
        player2: Option<u8>,

        /// Date (YYYY-MM-DD)
        #[arg(long, short)]
        date: Option<String>,

        /// Track name
        #[arg(long, short)]
        track: Option<String>,
    },

    /// Delete a race
    Delete {
        /// Race ID or ID prefix
        id: String,
    },

    /// List races
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show wins and average positions
    Stats {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show or set player names
    Names {
        /// New name for player 1
        #[arg(requires = "player2")]
        player1: Option<String>,

        /// New name for player 2
        player2: Option<String>,
    },

    /// Undo the last race change made in this session
    Undo,

    /// Redo the last undone race change
    Redo,
}

impl RaceCommand {
    pub fn run(&self, ctx: &mut AppContext) -> Result<(), CommandError> {
        let tracker = &mut ctx.races;
        match &self.command {
            RaceSubcommand::Add {
                player1,
                player2,
                date,
                track,
            } => {
                let mut race = Race::new(parse_date(date.as_deref())?, *player1, *player2);
                if let Some(track) = track {
                    race = race.with_track(track);
                }
                let race = tracker.add_race(race)?;
                println!("Recorded race {}", race.id.short());
                print_race(&race, tracker);
            }
            RaceSubcommand::Edit {
                id,
                player1,
                player2,
                date,
                track,
            } => {
                let id = find_id(&tracker.races(), id)?;
                let mut race = tracker
                    .store()
                    .get(id)
                    .ok_or_else(|| CommandError::InvalidInput(format!("Race not found: {}", id)))?;
                if let Some(p) = player1 {
                    race.player1 = *p;
                }
                if let Some(p) = player2 {
                    race.player2 = *p;
                }
                if date.is_some() {
                    race.date = parse_date(date.as_deref())?;
                }
                if let Some(t) = track {
                    race.track = Some(t.clone());
                }
                tracker.edit_race(race.clone())?;
                println!("Updated race {}", race.id.short());
                print_race(&race, tracker);
            }
            RaceSubcommand::Delete { id } => {
                let id = find_id(&tracker.races(), id)?;
                let race = tracker.delete_race(id)?;
                println!("Deleted race {} from {}", race.id.short(), race.date);
            }
            RaceSubcommand::List { format } => {
                let races = tracker.races();
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&races)?),
                    OutputFormat::Text => {
                        if races.is_empty() {
                            println!("No races recorded.");
                        }
                        for race in &races {
                            print_race(race, tracker);
                        }
                    }
                }
            }
            RaceSubcommand::Stats { format } => {
                let stats = tracker.stats();
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                    OutputFormat::Text => {
                        let names = tracker.player_names();
                        println!("Races: {}", stats.races);
                        println!(
                            "  {}: {} win(s), average {}",
                            names.player1,
                            stats.player1_wins,
                            average(stats.player1_average)
                        );
                        println!(
                            "  {}: {} win(s), average {}",
                            names.player2,
                            stats.player2_wins,
                            average(stats.player2_average)
                        );
                    }
                }
            }
            RaceSubcommand::Names { player1, player2 } => {
                if let (Some(p1), Some(p2)) = (player1, player2) {
                    tracker.set_player_names(p1, p2)?;
                }
                let names = tracker.player_names();
                println!("Player 1: {}", names.player1);
                println!("Player 2: {}", names.player2);
            }
            RaceSubcommand::Undo => print_step(tracker.undo()?, "Undo"),
            RaceSubcommand::Redo => print_step(tracker.redo()?, "Redo"),
        }
        Ok(())
    }
}

fn print_race(race: &Race, tracker: &RaceTracker) {
    let names = tracker.player_names();
    let track = race
        .track
        .as_deref()
        .map(|t| format!(" on {}", t))
        .unwrap_or_default();
    println!(
        "  [{}] {}{}: {} #{}, {} #{}",
        race.id.short(),
        race.date,
        track,
        names.player1,
        race.player1,
        names.player2,
        race.player2
    );
}

fn average(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v))
}
