//! Engine wiring
//!
//! Builds the ledger, registry, progress engine and activities over one store
//! and one [`Config`], plus the multi-step flows the interface layer runs:
//! first-run bootstrap, user registration and session sync.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::achievements::{Achievements, ReconcileReport, SeedReport};
use crate::activity::Activities;
use crate::config::Config;
use crate::domain::UserId;
use crate::ledger::Ledger;
use crate::progress::{ProgressReport, QuestProgress, publish_default_quests};
use crate::store::{DocumentStore, SqliteStore};

/// What [`Engine::register_user`] did
#[derive(Debug)]
pub struct Registration {
    /// Welcome bonus granted by this call
    pub welcome_bonus: bool,
    pub seed: SeedReport,
    pub progress: ProgressReport,
}

/// What [`Engine::sync`] did
#[derive(Debug)]
pub struct SyncReport {
    pub reconcile: ReconcileReport,
    pub progress: ProgressReport,
}

pub struct Engine {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub ledger: Arc<Ledger>,
    pub achievements: Arc<Achievements>,
    pub progress: Arc<QuestProgress>,
    pub activities: Activities,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        let ledger = Arc::new(Ledger::from_config(Arc::clone(&store), &config));
        let achievements = Arc::new(Achievements::from_config(Arc::clone(&store), &config));
        let progress = Arc::new(QuestProgress::from_config(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&achievements),
            &config,
        ));
        let activities = Activities::from_config(
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&progress),
            &config,
        );
        Self {
            config,
            store,
            ledger,
            achievements,
            progress,
            activities,
        }
    }

    /// Open the SQLite store named by the config
    pub fn open(config: Config) -> Result<Self> {
        let path = config.store.resolved_path();
        let store = SqliteStore::open(&path)
            .with_context(|| format!("Failed to open store: {}", path.display()))?;
        Ok(Self::new(Arc::new(store), config))
    }

    /// Publish the default quests that are not there yet. Returns the ids created.
    pub async fn bootstrap(&self) -> Result<Vec<String>> {
        publish_default_quests(&*self.store, Utc::now())
            .await
            .context("Failed to publish default quests")
    }

    /// Welcome bonus, first-run collectibles and quest catch-up for `user`
    ///
    /// Repeating it is harmless: the bonus and seeding only happen once.
    pub async fn register_user(&self, user: &UserId) -> Result<Registration> {
        let welcome_bonus = self
            .ledger
            .setup_initial_points(user)
            .await
            .with_context(|| format!("Failed to set up points for {user}"))?;
        let seed = self
            .achievements
            .seed(user, &self.config.achievements.starter)
            .await
            .context("Failed to seed achievements")?;
        let progress = self.progress.initialize_quest_progress(user).await;

        info!(
            user = %user,
            welcome_bonus,
            collectibles = seed.created,
            "Registered user"
        );
        Ok(Registration {
            welcome_bonus,
            seed,
            progress,
        })
    }

    /// Session start: repair half-recorded unlocks, then catch quests up
    pub async fn sync(&self, user: &UserId) -> Result<SyncReport> {
        let reconcile = self
            .achievements
            .reconcile(user)
            .await
            .with_context(|| format!("Failed to reconcile achievements for {user}"))?;
        let progress = self.progress.initialize_quest_progress(user).await;
        Ok(SyncReport {
            reconcile,
            progress,
        })
    }
}
