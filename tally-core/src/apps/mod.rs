//! The trackers built on [`AppStore`].
//!
//! Each tracker owns its own store object; nothing is global. Trackers expose
//! domain operations (add a race, log a workout) and delegate persistence,
//! undo/redo and sync to the store.

mod football;
mod players;
mod races;
mod store;
mod workouts;

pub use football::{FootballMatch, HeadToHead, HeadToHeadRecord};
pub use players::PlayerNames;
pub use races::{Race, RaceStats, RaceTracker};
pub use store::{AppError, AppStore};
pub use workouts::{GymData, Workout};
