//! Football head-to-head tracker.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::players::PlayerNames;
use super::store::{AppError, AppStore};
use crate::action_log::Step;
use crate::backup::{self, BackupError, BACKUP_DATE_FIELD};
use crate::record::{Record, RecordId};
use crate::store::LocalStore;
use crate::sync::{PushOutcome, SyncEngine};

pub const NAMESPACE: &str = "football";
pub const MATCHES_KEY: &str = "footballMatches";
pub const PLAYERS_KEY: &str = "footballPlayers";

const BACKUP_COLLECTION: &str = "matches";
const BACKUP_PLAYERS: &str = "players";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FootballMatch {
    #[serde(default)]
    pub id: RecordId,
    pub date: NaiveDate,
    pub player1_goals: u32,
    pub player2_goals: u32,
}

impl FootballMatch {
    pub fn new(date: NaiveDate, player1_goals: u32, player2_goals: u32) -> Self {
        Self {
            id: RecordId::new(),
            date,
            player1_goals,
            player2_goals,
        }
    }
}

impl Record for FootballMatch {
    fn id(&self) -> RecordId {
        self.id
    }
}

/// Aggregate results across every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HeadToHeadRecord {
    pub played: usize,
    pub player1_wins: usize,
    pub player2_wins: usize,
    pub draws: usize,
    pub player1_goals: u32,
    pub player2_goals: u32,
}

#[derive(Debug)]
pub struct HeadToHead {
    matches: AppStore<FootballMatch>,
    local: LocalStore,
    players: PlayerNames,
}

impl HeadToHead {
    pub fn load(local: LocalStore) -> Self {
        Self {
            matches: AppStore::load(local.clone(), NAMESPACE, MATCHES_KEY),
            players: PlayerNames::load(&local, PLAYERS_KEY),
            local,
        }
    }

    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.matches = self.matches.with_undo_limit(limit);
        self
    }

    pub async fn enable_sync(&mut self, engine: &SyncEngine) -> Result<(), AppError> {
        self.matches.enable_sync(engine).await
    }

    pub fn store(&self) -> &AppStore<FootballMatch> {
        &self.matches
    }

    pub fn matches(&self) -> Vec<FootballMatch> {
        self.matches.records()
    }

    pub fn players(&self) -> &PlayerNames {
        &self.players
    }

    pub fn add_match(&mut self, played: FootballMatch) -> Result<FootballMatch, AppError> {
        self.matches.add(played.clone())?;
        Ok(played)
    }

    pub fn delete_match(&mut self, id: RecordId) -> Result<FootballMatch, AppError> {
        self.matches.delete(id)
    }

    pub fn undo(&mut self) -> Result<Option<Step>, AppError> {
        self.matches.undo()
    }

    pub fn redo(&mut self) -> Result<Option<Step>, AppError> {
        self.matches.redo()
    }

    pub fn set_players(&mut self, player1: &str, player2: &str) -> Result<(), AppError> {
        let players = PlayerNames::new(player1, player2)?;
        players.save(&self.local, PLAYERS_KEY)?;
        self.players = players;
        Ok(())
    }

    pub fn record(&self) -> HeadToHeadRecord {
        self.matches
            .records()
            .iter()
            .fold(HeadToHeadRecord::default(), |mut acc, m| {
                acc.played += 1;
                acc.player1_goals += m.player1_goals;
                acc.player2_goals += m.player2_goals;
                match m.player1_goals.cmp(&m.player2_goals) {
                    std::cmp::Ordering::Greater => acc.player1_wins += 1,
                    std::cmp::Ordering::Less => acc.player2_wins += 1,
                    std::cmp::Ordering::Equal => acc.draws += 1,
                }
                acc
            })
    }

    pub fn export_backup(&self) -> Result<String, AppError> {
        let players = serde_json::to_value(&self.players).map_err(|e| BackupError::Serialize(e.to_string()))?;
        let mut extras = Map::new();
        extras.insert(BACKUP_PLAYERS.to_string(), players);
        Ok(backup::export_backup(
            BACKUP_COLLECTION,
            &self.matches.records(),
            extras,
            BACKUP_DATE_FIELD,
        )?)
    }

    pub fn import_backup(&mut self, text: &str) -> Result<usize, AppError> {
        let parsed = backup::parse_backup::<FootballMatch>(text, BACKUP_COLLECTION)?;
        let players: Option<PlayerNames> = parsed.extra(BACKUP_PLAYERS)?;
        let count = parsed.records.len();
        self.matches.replace_all(parsed.records)?;
        if let Some(players) = players {
            players.save(&self.local, PLAYERS_KEY)?;
            self.players = players;
        }
        tracing::info!("Imported {} match(es)", count);
        Ok(count)
    }

    pub fn reload(&mut self) -> Result<(), AppError> {
        self.players = PlayerNames::load(&self.local, PLAYERS_KEY);
        self.matches.reload()
    }

    pub async fn flush(&mut self) -> Vec<PushOutcome> {
        self.matches.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_record_counts_results() {
        let mut h2h = HeadToHead::load(LocalStore::in_memory());
        h2h.add_match(FootballMatch::new(date("2024-04-01"), 3, 1)).unwrap();
        h2h.add_match(FootballMatch::new(date("2024-04-02"), 2, 2)).unwrap();
        h2h.add_match(FootballMatch::new(date("2024-04-03"), 0, 1)).unwrap();

        assert_eq!(
            h2h.record(),
            HeadToHeadRecord {
                played: 3,
                player1_wins: 1,
                player2_wins: 1,
                draws: 1,
                player1_goals: 5,
                player2_goals: 4,
            }
        );
    }

    #[test]
    fn test_delete_and_undo() {
        let mut h2h = HeadToHead::load(LocalStore::in_memory());
        let played = h2h.add_match(FootballMatch::new(date("2024-04-01"), 1, 0)).unwrap();
        h2h.delete_match(played.id).unwrap();
        assert!(h2h.matches().is_empty());

        h2h.undo().unwrap();
        assert_eq!(h2h.matches(), vec![played]);
    }

    #[test]
    fn test_camel_case_storage() {
        let json = serde_json::to_value(FootballMatch::new(date("2024-04-01"), 1, 0)).unwrap();
        assert!(json.get("player1Goals").is_some());
    }

    #[test]
    fn test_import_keeps_players_when_missing() {
        let mut h2h = HeadToHead::load(LocalStore::in_memory());
        h2h.set_players("Ana", "Ben").unwrap();

        let count = h2h
            .import_backup(r#"{"matches": [{"date": "2024-04-01", "player1Goals": 2, "player2Goals": 0}]}"#)
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(h2h.players().player1, "Ana");
    }

    #[test]
    fn test_backup_round_trip_with_players() {
        let mut source = HeadToHead::load(LocalStore::in_memory());
        source.set_players("Ana", "Ben").unwrap();
        source.add_match(FootballMatch::new(date("2024-04-01"), 2, 1)).unwrap();

        let mut target = HeadToHead::load(LocalStore::in_memory());
        target.import_backup(&source.export_backup().unwrap()).unwrap();

        assert_eq!(target.matches(), source.matches());
        assert_eq!(target.players(), source.players());
    }
}
