use clap::{Args, Subcommand};

use tally_core::{FootballMatch, HeadToHead};

use super::{find_id, parse_date, print_step, CommandError, OutputFormat};
use crate::context::AppContext;

#[derive(Args)]
pub struct FootballCommand {
    #[command(subcommand)]
    pub command: FootballSubcommand,
}

#[derive(Subcommand)]
pub enum FootballSubcommand {
    /// Record a match result
    Add {
        /// Goals scored by player 1
        player1_goals: u32,

        /// Goals scored by player 2
        player2_goals: u32,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Delete a match
    Delete {
        /// Match ID or ID prefix
        id: String,
    },

    /// List matches
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the head-to-head record
    Record {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show or set player names
    Players {
        #[arg(requires = "player2")]
        player1: Option<String>,

        player2: Option<String>,
    },

    /// Undo the last match change made in this session
    Undo,

    /// Redo the last undone match change
    Redo,
}

impl FootballCommand {
    pub fn run(&self, ctx: &mut AppContext) -> Result<(), CommandError> {
        let h2h = &mut ctx.football;
        match &self.command {
            FootballSubcommand::Add {
                player1_goals,
                player2_goals,
                date,
            } => {
                let date = parse_date(date.as_deref())?;
                let played = h2h.add_match(FootballMatch::new(date, *player1_goals, *player2_goals))?;
                println!("Recorded match {}", played.id.short());
                print_match(&played, h2h);
            }
            FootballSubcommand::Delete { id } => {
                let id = find_id(&h2h.matches(), id)?;
                let played = h2h.delete_match(id)?;
                println!("Deleted match {} from {}", played.id.short(), played.date);
            }
            FootballSubcommand::List { format } => {
                let matches = h2h.matches();
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&matches)?),
                    OutputFormat::Text => {
                        if matches.is_empty() {
                            println!("No matches recorded.");
                        }
                        for played in &matches {
                            print_match(played, h2h);
                        }
                    }
                }
            }
            FootballSubcommand::Record { format } => {
                let record = h2h.record();
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                    OutputFormat::Text => {
                        let players = h2h.players();
                        println!("Played: {}", record.played);
                        println!(
                            "  {}: {} win(s), {} goal(s)",
                            players.player1, record.player1_wins, record.player1_goals
                        );
                        println!(
                            "  {}: {} win(s), {} goal(s)",
                            players.player2, record.player2_wins, record.player2_goals
                        );
                        println!("  Draws: {}", record.draws);
                    }
                }
            }
            FootballSubcommand::Players { player1, player2 } => {
                if let (Some(p1), Some(p2)) = (player1, player2) {
                    h2h.set_players(p1, p2)?;
                }
                let players = h2h.players();
                println!("Player 1: {}", players.player1);
                println!("Player 2: {}", players.player2);
            }
            FootballSubcommand::Undo => print_step(h2h.undo()?, "Undo"),
            FootballSubcommand::Redo => print_step(h2h.redo()?, "Redo"),
        }
        Ok(())
    }
}

fn print_match(played: &FootballMatch, h2h: &HeadToHead) {
    let players = h2h.players();
    println!(
        "  [{}] {}: {} {} - {} {}",
        played.id.short(),
        played.date,
        players.player1,
        played.player1_goals,
        played.player2_goals,
        players.player2
    );
}
