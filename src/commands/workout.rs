use clap::{Args, Subcommand};

use tally_core::Workout;

use super::{find_id, parse_date, print_step, CommandError, OutputFormat};
use crate::context::AppContext;

#[derive(Args)]
pub struct WorkoutCommand {
    #[command(subcommand)]
    pub command: WorkoutSubcommand,
}

#[derive(Subcommand)]
pub enum WorkoutSubcommand {
    /// Log a workout
    Add {
        /// Exercise name
        exercise: String,

        #[arg(long, short)]
        sets: u32,

        #[arg(long, short)]
        reps: u32,

        /// Weight per rep
        #[arg(long, short, default_value = "0")]
        weight: f64,

        /// Date (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        #[arg(long, short)]
        notes: Option<String>,
    },

    /// Change a logged workout
    Update {
        /// Workout ID or ID prefix
        id: String,

        #[arg(long, short)]
        exercise: Option<String>,

        #[arg(long, short)]
        sets: Option<u32>,

        #[arg(long, short)]
        reps: Option<u32>,

        #[arg(long, short)]
        weight: Option<f64>,

        /// Date (YYYY-MM-DD)
        #[arg(long, short)]
        date: Option<String>,

        #[arg(long, short)]
        notes: Option<String>,
    },

    /// Delete a workout
    Delete {
        /// Workout ID or ID prefix
        id: String,
    },

    /// List workouts, newest first
    List {
        /// Only workouts on this date (YYYY-MM-DD)
        #[arg(long, short)]
        date: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the heaviest set logged for an exercise
    Best {
        exercise: String,
    },

    /// Show total volume (sets x reps x weight)
    Volume {
        /// Limit to one exercise
        exercise: Option<String>,
    },

    /// Undo the last workout change made in this session
    Undo,

    /// Redo the last undone workout change
    Redo,
}

impl WorkoutCommand {
    pub fn run(&self, ctx: &mut AppContext) -> Result<(), CommandError> {
        let gym = &mut ctx.gym;
        match &self.command {
            WorkoutSubcommand::Add {
                exercise,
                sets,
                reps,
                weight,
                date,
                notes,
            } => {
                let date = parse_date(date.as_deref())?;
                let mut workout = Workout::new(date, exercise, *sets, *reps, *weight);
                if let Some(n) = notes {
                    workout = workout.with_notes(n);
                }
                let workout = gym.add_workout(workout)?;
                println!("Logged workout {}", workout.id.short());
                print_workout(&workout);
            }
            WorkoutSubcommand::Update {
                id,
                exercise,
                sets,
                reps,
                weight,
                date,
                notes,
            } => {
                let id = find_id(&gym.workouts(), id)?;
                let mut workout = gym
                    .store()
                    .get(id)
                    .ok_or_else(|| CommandError::InvalidInput(format!("Workout not found: {}", id)))?;
                if let Some(e) = exercise {
                    workout.exercise = e.clone();
                }
                if let Some(s) = sets {
                    workout.sets = *s;
                }
                if let Some(r) = reps {
                    workout.reps = *r;
                }
                if let Some(w) = weight {
                    workout.weight = *w;
                }
                if date.is_some() {
                    workout.date = parse_date(date.as_deref())?;
                }
                if let Some(n) = notes {
                    workout.notes = Some(n.clone());
                }
                gym.update_workout(workout.clone())?;
                println!("Updated workout {}", workout.id.short());
                print_workout(&workout);
            }
            WorkoutSubcommand::Delete { id } => {
                let id = find_id(&gym.workouts(), id)?;
                let workout = gym.delete_workout(id)?;
                println!("Deleted {} on {}", workout.exercise, workout.date);
            }
            WorkoutSubcommand::List { date, format } => {
                let workouts = match date {
                    Some(_) => gym.workouts_on(parse_date(date.as_deref())?),
                    None => gym.workouts(),
                };
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&workouts)?),
                    OutputFormat::Text => {
                        if workouts.is_empty() {
                            println!("No workouts found.");
                        }
                        for workout in &workouts {
                            print_workout(workout);
                        }
                    }
                }
            }
            WorkoutSubcommand::Best { exercise } => match gym.personal_best(exercise) {
                Some(best) => {
                    println!("Personal best for {}:", exercise);
                    print_workout(&best);
                }
                None => println!("No {} workouts logged.", exercise),
            },
            WorkoutSubcommand::Volume { exercise } => {
                let volume = gym.total_volume(exercise.as_deref());
                match exercise {
                    Some(e) => println!("Total volume for {}: {:.1}", e, volume),
                    None => println!("Total volume: {:.1}", volume),
                }
            }
            WorkoutSubcommand::Undo => print_step(gym.undo()?, "Undo"),
            WorkoutSubcommand::Redo => print_step(gym.redo()?, "Redo"),
        }
        Ok(())
    }
}

fn print_workout(workout: &Workout) {
    println!(
        "  [{}] {} {}: {}x{} @ {}",
        workout.id.short(),
        workout.date,
        workout.exercise,
        workout.sets,
        workout.reps,
        workout.weight
    );
    if let Some(notes) = &workout.notes {
        println!("      {}", notes);
    }
}
