//! Gym workout log.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::store::{AppError, AppStore};
use crate::action_log::Step;
use crate::backup::{self, EXPORT_DATE_FIELD};
use crate::record::{Record, RecordId};
use crate::store::LocalStore;
use crate::sync::{PushOutcome, SyncEngine};

pub const NAMESPACE: &str = "gym";
pub const WORKOUTS_KEY: &str = "gymWorkouts";

const BACKUP_COLLECTION: &str = "workouts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Workout {
    #[serde(default)]
    pub id: RecordId,
    pub date: NaiveDate,
    pub exercise: String,
    pub sets: u32,
    pub reps: u32,
    /// Weight per rep, in the user's unit.
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Workout {
    pub fn new(date: NaiveDate, exercise: impl Into<String>, sets: u32, reps: u32, weight: f64) -> Self {
        Self {
            id: RecordId::new(),
            date,
            exercise: exercise.into(),
            sets,
            reps,
            weight,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// sets × reps × weight
    pub fn volume(&self) -> f64 {
        f64::from(self.sets) * f64::from(self.reps) * self.weight
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.exercise.trim().is_empty() {
            return Err(AppError::Invalid("exercise name is required".to_string()));
        }
        if self.sets == 0 || self.reps == 0 {
            return Err(AppError::Invalid("sets and reps must be at least 1".to_string()));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(AppError::Invalid(format!("weight {} is not valid", self.weight)));
        }
        Ok(())
    }

    fn is_exercise(&self, exercise: &str) -> bool {
        self.exercise.trim().eq_ignore_ascii_case(exercise.trim())
    }
}

impl Record for Workout {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug)]
pub struct GymData {
    workouts: AppStore<Workout>,
}

impl GymData {
    pub fn load(local: LocalStore) -> Self {
        Self {
            workouts: AppStore::load(local, NAMESPACE, WORKOUTS_KEY),
        }
    }

    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.workouts = self.workouts.with_undo_limit(limit);
        self
    }

    pub async fn enable_sync(&mut self, engine: &SyncEngine) -> Result<(), AppError> {
        self.workouts.enable_sync(engine).await
    }

    pub fn store(&self) -> &AppStore<Workout> {
        &self.workouts
    }

    /// All workouts, newest date first.
    pub fn workouts(&self) -> Vec<Workout> {
        let mut workouts = self.workouts.records();
        workouts.sort_by(|a, b| b.date.cmp(&a.date));
        workouts
    }

    pub fn add_workout(&mut self, workout: Workout) -> Result<Workout, AppError> {
        workout.validate()?;
        self.workouts.add(workout.clone())?;
        Ok(workout)
    }

    /// Replaces a workout. Returns the previous version.
    pub fn update_workout(&mut self, workout: Workout) -> Result<Workout, AppError> {
        workout.validate()?;
        self.workouts.edit(workout)
    }

    pub fn delete_workout(&mut self, id: RecordId) -> Result<Workout, AppError> {
        self.workouts.delete(id)
    }

    pub fn undo(&mut self) -> Result<Option<Step>, AppError> {
        self.workouts.undo()
    }

    pub fn redo(&mut self) -> Result<Option<Step>, AppError> {
        self.workouts.redo()
    }

    pub fn workouts_on(&self, date: NaiveDate) -> Vec<Workout> {
        self.workouts
            .records()
            .into_iter()
            .filter(|w| w.date == date)
            .collect()
    }

    /// Heaviest set logged for `exercise` (case-insensitive); earliest wins ties.
    pub fn personal_best(&self, exercise: &str) -> Option<Workout> {
        let mut candidates: Vec<Workout> = self
            .workouts
            .records()
            .into_iter()
            .filter(|w| w.is_exercise(exercise))
            .collect();
        candidates.sort_by(|a, b| a.date.cmp(&b.date));
        candidates
            .into_iter()
            .fold(None, |best: Option<Workout>, w| match best {
                Some(b) if b.weight >= w.weight => Some(b),
                _ => Some(w),
            })
    }

    /// Total volume, optionally limited to one exercise.
    pub fn total_volume(&self, exercise: Option<&str>) -> f64 {
        self.workouts
            .records()
            .iter()
            .filter(|w| exercise.map_or(true, |e| w.is_exercise(e)))
            .map(Workout::volume)
            .sum()
    }

    pub fn export_backup(&self) -> Result<String, AppError> {
        Ok(backup::export_backup(
            BACKUP_COLLECTION,
            &self.workouts.records(),
            Map::new(),
            EXPORT_DATE_FIELD,
        )?)
    }

    pub fn import_backup(&mut self, text: &str) -> Result<usize, AppError> {
        let parsed = backup::parse_backup::<Workout>(text, BACKUP_COLLECTION)?;
        for workout in &parsed.records {
            workout.validate()?;
        }
        let count = parsed.records.len();
        self.workouts.replace_all(parsed.records)?;
        tracing::info!("Imported {} workout(s)", count);
        Ok(count)
    }

    pub fn reload(&mut self) -> Result<(), AppError> {
        self.workouts.reload()
    }

    pub async fn flush(&mut self) -> Vec<PushOutcome> {
        self.workouts.flush().await
    }
}
