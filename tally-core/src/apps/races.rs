//! Mario Kart race tracker: two players, one finishing position each.

use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::players::PlayerNames;
use super::store::{AppError, AppStore};
use crate::action_log::Step;
use crate::backup::{self, BACKUP_DATE_FIELD};
use crate::record::{Record, RecordId};
use crate::store::LocalStore;
use crate::sync::{PushOutcome, SyncEngine};

pub const NAMESPACE: &str = "marioKart";
pub const RACES_KEY: &str = "marioKartRaces";
pub const PLAYER_NAMES_KEY: &str = "marioKartPlayerNames";

const BACKUP_COLLECTION: &str = "races";
const BACKUP_NAMES: &str = "playerNames";

/// Valid finishing positions in a 12-racer grid.
pub const POSITIONS: RangeInclusive<u8> = 1..=12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Race {
    #[serde(default)]
    pub id: RecordId,
    pub date: NaiveDate,
    /// Finishing position of player 1.
    pub player1: u8,
    /// Finishing position of player 2.
    pub player2: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

impl Race {
    pub fn new(date: NaiveDate, player1: u8, player2: u8) -> Self {
        Self {
            id: RecordId::new(),
            date,
            player1,
            player2,
            track: None,
        }
    }

    pub fn with_track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }

    fn validate(&self) -> Result<(), AppError> {
        for position in [self.player1, self.player2] {
            if !POSITIONS.contains(&position) {
                return Err(AppError::Invalid(format!(
                    "position {} is outside {}-{}",
                    position,
                    POSITIONS.start(),
                    POSITIONS.end()
                )));
            }
        }
        if self.player1 == self.player2 {
            return Err(AppError::Invalid("both players cannot finish in the same position".to_string()));
        }
        Ok(())
    }
}

impl Record for Race {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RaceStats {
    pub races: usize,
    pub player1_wins: usize,
    pub player2_wins: usize,
    pub player1_average: Option<f64>,
    pub player2_average: Option<f64>,
}

#[derive(Debug)]
pub struct RaceTracker {
    races: AppStore<Race>,
    local: LocalStore,
    names: PlayerNames,
}

impl RaceTracker {
    pub fn load_saved_data(local: LocalStore) -> Self {
        Self {
            races: AppStore::load(local.clone(), NAMESPACE, RACES_KEY),
            names: PlayerNames::load(&local, PLAYER_NAMES_KEY),
            local,
        }
    }

    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.races = self.races.with_undo_limit(limit);
        self
    }

    pub async fn enable_sync(&mut self, engine: &SyncEngine) -> Result<(), AppError> {
        self.races.enable_sync(engine).await
    }

    pub fn store(&self) -> &AppStore<Race> {
        &self.races
    }

    pub fn races(&self) -> Vec<Race> {
        self.races.records()
    }

    pub fn player_names(&self) -> &PlayerNames {
        &self.names
    }

    pub fn add_race(&mut self, race: Race) -> Result<Race, AppError> {
        race.validate()?;
        self.races.add(race.clone())?;
        tracing::debug!("Added race {}", race.id.short());
        Ok(race)
    }

    /// Replaces a race. Returns the previous version.
    pub fn edit_race(&mut self, race: Race) -> Result<Race, AppError> {
        race.validate()?;
        self.races.edit(race)
    }

    pub fn delete_race(&mut self, id: RecordId) -> Result<Race, AppError> {
        self.races.delete(id)
    }

    pub fn undo(&mut self) -> Result<Option<Step>, AppError> {
        self.races.undo()
    }

    pub fn redo(&mut self) -> Result<Option<Step>, AppError> {
        self.races.redo()
    }

    pub fn set_player_names(&mut self, player1: &str, player2: &str) -> Result<(), AppError> {
        let names = PlayerNames::new(player1, player2)?;
        names.save(&self.local, PLAYER_NAMES_KEY)?;
        self.names = names;
        Ok(())
    }

    pub fn stats(&self) -> RaceStats {
        let races = self.races.records();
        if races.is_empty() {
            return RaceStats::default();
        }
        let count = races.len() as f64;
        let total = |pick: fn(&Race) -> u8| races.iter().map(|r| f64::from(pick(r))).sum::<f64>();
        RaceStats {
            races: races.len(),
            player1_wins: races.iter().filter(|r| r.player1 < r.player2).count(),
            player2_wins: races.iter().filter(|r| r.player2 < r.player1).count(),
            player1_average: Some(total(|r| r.player1) / count),
            player2_average: Some(total(|r| r.player2) / count),
        }
    }

    pub fn export_backup(&self) -> Result<String, AppError> {
        let mut extras = Map::new();
        let names = serde_json::to_value(&self.names)
            .map_err(|e| backup::BackupError::Serialize(e.to_string()))?;
        extras.insert(BACKUP_NAMES.to_string(), names);
        Ok(backup::export_backup(
            BACKUP_COLLECTION,
            &self.races.records(),
            extras,
            BACKUP_DATE_FIELD,
        )?)
    }

    /// Replaces all races with the backup's. Player names are only replaced
    /// when the file carries them. Returns the number of races imported.
    pub fn import_backup(&mut self, text: &str) -> Result<usize, AppError> {
        let parsed = backup::parse_backup::<Race>(text, BACKUP_COLLECTION)?;
        for race in &parsed.records {
            race.validate()?;
        }
        let names: Option<PlayerNames> = parsed.extra(BACKUP_NAMES)?;

        let count = parsed.records.len();
        self.races.replace_all(parsed.records)?;
        if let Some(names) = names {
            names.save(&self.local, PLAYER_NAMES_KEY)?;
            self.names = names;
        }
        tracing::info!("Imported {} race(s)", count);
        Ok(count)
    }

    pub fn reload(&mut self) -> Result<(), AppError> {
        self.names = PlayerNames::load(&self.local, PLAYER_NAMES_KEY);
        self.races.reload()
    }

    pub async fn flush(&mut self) -> Vec<PushOutcome> {
        self.races.flush().await
    }
}
