//! Stores, auth, sync and trackers wired together for one CLI run.

use std::sync::Arc;

use tally_core::{
    AuthSession, DirRemoteStore, GymData, HeadToHead, LocalAuthProvider, LocalStore, PushOutcome,
    RaceTracker, SyncEngine, User,
};

use crate::commands::CommandError;
use crate::config::Config;

/// Local store directory inside `data_dir`.
const STORE_DIR: &str = "store";
/// Account store directory inside `sync.remote_dir`.
const ACCOUNTS_DIR: &str = "accounts";
/// Remote document directory inside `sync.remote_dir`.
const DOCUMENTS_DIR: &str = "documents";

pub struct AppContext {
    pub local: LocalStore,
    pub session: AuthSession,
    pub engine: Option<SyncEngine>,
    pub races: RaceTracker,
    pub gym: GymData,
    pub football: HeadToHead,
}

impl AppContext {
    /// Opens the local store, resolves the saved session and, when a user
    /// is signed in and sync is configured, registers every tracker.
    pub async fn open(config: &Config) -> Result<Self, CommandError> {
        let local = LocalStore::open(config.data_dir.value.join(STORE_DIR));

        // Accounts go next to the remote documents so every device sees them.
        let accounts = match &config.sync.remote_dir {
            Some(dir) => LocalStore::open(dir.join(ACCOUNTS_DIR)),
            None => local.clone(),
        };
        let provider = Arc::new(LocalAuthProvider::new(accounts, local.clone()));
        let session = AuthSession::new(provider);

        let engine = match (&config.sync.remote_dir, config.sync.auto_sync) {
            (Some(dir), true) => {
                let remote = DirRemoteStore::new(dir.join(DOCUMENTS_DIR));
                Some(SyncEngine::new(local.clone(), Arc::new(remote))?)
            }
            _ => None,
        };

        let limit = config.undo_limit.value;
        let mut ctx = Self {
            races: RaceTracker::load_saved_data(local.clone()).with_undo_limit(limit),
            gym: GymData::load(local.clone()).with_undo_limit(limit),
            football: HeadToHead::load(local.clone()).with_undo_limit(limit),
            local,
            session,
            engine,
        };

        if let Some(user) = ctx.session.initialize().await {
            tracing::debug!("Resumed session for {}", user.uid);
            ctx.attach_sync(user).await;
        }
        Ok(ctx)
    }

    /// Activates sync for `user` and registers every tracker.
    ///
    /// Sync failures are reported and the trackers keep working locally.
    pub async fn attach_sync(&mut self, user: User) {
        let Some(engine) = self.engine.clone() else {
            return;
        };
        engine.handle_signed_in(user).await;

        let results = [
            self.races.enable_sync(&engine).await,
            self.gym.enable_sync(&engine).await,
            self.football.enable_sync(&engine).await,
        ];
        for e in results.into_iter().filter_map(Result::err) {
            eprintln!("Sync: {}", e);
        }
    }

    /// Stops syncing. Local data stays in place.
    pub fn detach_sync(&self) {
        if let Some(engine) = &self.engine {
            engine.handle_signed_out();
        }
    }

    /// Re-reads every tracker from the local store.
    pub fn reload_all(&mut self) -> Result<(), CommandError> {
        self.races.reload()?;
        self.gym.reload()?;
        self.football.reload()?;
        Ok(())
    }

    /// Waits for queued pushes. Failures are reported, never fatal.
    pub async fn finish(&mut self) {
        let mut outcomes = self.races.flush().await;
        outcomes.extend(self.gym.flush().await);
        outcomes.extend(self.football.flush().await);

        for outcome in outcomes {
            if let PushOutcome::Failed(reason) = outcome {
                eprintln!("Sync: saved locally, push failed: {}", reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, ConfigValue};
    use tally_core::Race;
    use tempfile::tempdir;

    fn config_for(data: &std::path::Path, remote: Option<&std::path::Path>) -> Config {
        let mut config = Config::load(Some(data.join("missing.yaml"))).unwrap();
        config.data_dir = ConfigValue::new(data.to_path_buf(), ConfigSource::File);
        config.sync.remote_dir = remote.map(|p| p.to_path_buf());
        config
    }

    #[tokio::test]
    async fn test_open_without_sync() {
        let data = tempdir().unwrap();
        let mut ctx = AppContext::open(&config_for(data.path(), None)).await.unwrap();

        assert!(ctx.engine.is_none());
        assert!(ctx.session.current_user().is_none());

        let date = "2024-01-01".parse().unwrap();
        ctx.races.add_race(Race::new(date, 1, 2)).unwrap();
        ctx.finish().await;

        let reopened = AppContext::open(&config_for(data.path(), None)).await.unwrap();
        assert_eq!(reopened.races.races().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_pulls_data_from_other_device() {
        let remote = tempdir().unwrap();
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();

        let mut a = AppContext::open(&config_for(first.path(), Some(remote.path())))
            .await
            .unwrap();
        let result = a.session.sign_up("ana@example.com", "secret1").await;
        assert!(result.success);
        a.attach_sync(result.user.unwrap()).await;
        a.races
            .add_race(Race::new("2024-01-01".parse().unwrap(), 1, 2))
            .unwrap();
        a.finish().await;

        let mut b = AppContext::open(&config_for(second.path(), Some(remote.path())))
            .await
            .unwrap();
        assert!(b.races.races().is_empty());
        let result = b.session.sign_in("ana@example.com", "secret1").await;
        assert!(result.success);
        b.attach_sync(result.user.unwrap()).await;

        assert_eq!(b.races.races(), a.races.races());
    }
}
