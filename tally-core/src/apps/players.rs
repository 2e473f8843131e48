//! Two-player name pair used by the head-to-head trackers.

use serde::{Deserialize, Serialize};

use super::store::AppError;
use crate::store::LocalStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerNames {
    pub player1: String,
    pub player2: String,
}

impl Default for PlayerNames {
    fn default() -> Self {
        Self {
            player1: "Player 1".to_string(),
            player2: "Player 2".to_string(),
        }
    }
}

impl PlayerNames {
    pub fn new(player1: &str, player2: &str) -> Result<Self, AppError> {
        let (player1, player2) = (player1.trim(), player2.trim());
        if player1.is_empty() || player2.is_empty() {
            return Err(AppError::Invalid("player names cannot be empty".to_string()));
        }
        Ok(Self {
            player1: player1.to_string(),
            player2: player2.to_string(),
        })
    }

    pub(crate) fn load(local: &LocalStore, key: &str) -> Self {
        local.get(key)
    }

    pub(crate) fn save(&self, local: &LocalStore, key: &str) -> Result<(), AppError> {
        local.set(key, self)?;
        Ok(())
    }
}
