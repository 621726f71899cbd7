//! Achievement Registry
//!
//! Tracks, per collectible, the users who unlocked it. An unlock touches two
//! documents: the collectible's `unlockedBy` list and the user's
//! `achievementIds`. Both writes are idempotent and conditional, but they are
//! not one transaction, so [`Achievements::reconcile`] repairs whichever side
//! is missing after an interrupted unlock.

mod catalog;

pub use catalog::{COUNTRIES, Country};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{Collectible, User, UserId};
use crate::error::StoreError;
use crate::locks::KeyedLocks;
use crate::store::{DocumentStore, collections, encode, fetch, fetch_all, pick};

/// Result of [`Achievements::unlock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked(DateTime<Utc>),
    AlreadyUnlocked(DateTime<Utc>),
}

impl UnlockOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Unlocked(_))
    }

    pub fn unlocked_at(&self) -> DateTime<Utc> {
        match *self {
            Self::Unlocked(at) | Self::AlreadyUnlocked(at) => at,
        }
    }
}

/// Result of first-run seeding
#[derive(Debug, Default)]
pub struct SeedReport {
    /// Registry entries created. Zero when the registry was already populated.
    pub created: usize,
    pub unlocks: Vec<(String, Result<UnlockOutcome, StoreError>)>,
}

/// Which document a reconciliation repair wrote to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairSide {
    /// Collectible listed the user, user document lacked the id
    User,
    /// User document had the id, collectible did not list the user
    Registry,
}

#[derive(Debug)]
pub struct Repair {
    pub collectible_id: String,
    pub side: RepairSide,
    pub outcome: Result<(), StoreError>,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub repairs: Vec<Repair>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Repair> {
        self.repairs.iter().filter(|r| r.outcome.is_err())
    }
}

/// Registry of collectible unlocks
pub struct Achievements {
    store: Arc<dyn DocumentStore>,
    locks: KeyedLocks,
    max_retries: u32,
}

impl Achievements {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::from_config(store, &Config::default())
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            max_retries: config.engine.max_write_retries.max(1),
        }
    }

    /// Unlock `collectible_id` for `user`, at most once
    ///
    /// The collectible must exist. The user's `achievementIds` is brought in
    /// line even when the collectible already listed the user.
    pub async fn unlock(
        &self,
        collectible_id: &str,
        user: &UserId,
    ) -> Result<UnlockOutcome, StoreError> {
        let outcome = self.record_on_registry(collectible_id, user, false).await?;
        match outcome {
            UnlockOutcome::Unlocked(_) => {
                info!(user = %user, collectible = collectible_id, "Achievement unlocked")
            }
            UnlockOutcome::AlreadyUnlocked(_) => {
                debug!(user = %user, collectible = collectible_id, "Achievement already unlocked")
            }
        }
        self.record_on_user(collectible_id, user).await?;
        Ok(outcome)
    }

    pub async fn is_unlocked_by(
        &self,
        collectible_id: &str,
        user: &UserId,
    ) -> Result<bool, StoreError> {
        Ok(self.unlock_date(collectible_id, user).await?.is_some())
    }

    /// `None` when the user has not unlocked it or the collectible does not exist
    pub async fn unlock_date(
        &self,
        collectible_id: &str,
        user: &UserId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        match fetch::<Collectible>(&*self.store, collections::ACHIEVEMENTS, collectible_id).await {
            Ok((collectible, _)) => Ok(collectible.unlock_date(user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ids of every collectible that lists `user`
    pub async fn unlocked_by(&self, user: &UserId) -> Result<Vec<String>, StoreError> {
        let all = fetch_all::<Collectible>(&*self.store, collections::ACHIEVEMENTS).await?;
        Ok(all
            .into_iter()
            .filter(|c| c.is_unlocked_by(user))
            .map(|c| c.id)
            .collect())
    }

    /// First run: populate the registry from the catalog, then unlock `starter` for `user`
    ///
    /// Does nothing when any collectible already exists.
    pub async fn seed(&self, user: &UserId, starter: &[String]) -> Result<SeedReport, StoreError> {
        if !self.store.list(collections::ACHIEVEMENTS).await?.is_empty() {
            debug!("Achievement registry already seeded");
            return Ok(SeedReport::default());
        }

        let mut report = SeedReport::default();
        for country in COUNTRIES {
            let fields = encode(&Collectible::new(country.code))?;
            match self
                .store
                .create(collections::ACHIEVEMENTS, country.code, fields)
                .await
            {
                Ok(_) => report.created += 1,
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        info!(created = report.created, "Seeded achievement registry");

        for code in starter {
            let result = self.unlock(code, user).await;
            if let Err(e) = &result {
                warn!(collectible = %code, error = %e, "Failed to unlock starter achievement");
            }
            report.unlocks.push((code.clone(), result));
        }
        Ok(report)
    }

    /// Repair unlocks recorded on only one side
    pub async fn reconcile(&self, user: &UserId) -> Result<ReconcileReport, StoreError> {
        let listed = self.unlocked_by(user).await?;
        let (account, _) = fetch::<User>(&*self.store, collections::USERS, user.as_str()).await?;

        let mut report = ReconcileReport::default();
        for id in listed.iter().filter(|id| !account.has_achievement(id)) {
            let outcome = self.record_on_user(id, user).await;
            report.repairs.push(Repair {
                collectible_id: id.clone(),
                side: RepairSide::User,
                outcome,
            });
        }
        for id in account
            .achievement_ids
            .iter()
            .filter(|id| !listed.contains(id))
        {
            let outcome = self.record_on_registry(id, user, true).await.map(|_| ());
            report.repairs.push(Repair {
                collectible_id: id.clone(),
                side: RepairSide::Registry,
                outcome,
            });
        }

        for repair in &report.repairs {
            match &repair.outcome {
                Ok(()) => info!(
                    user = %user,
                    collectible = %repair.collectible_id,
                    side = ?repair.side,
                    "Repaired half-recorded unlock"
                ),
                Err(e) => warn!(
                    user = %user,
                    collectible = %repair.collectible_id,
                    error = %e,
                    "Failed to repair unlock"
                ),
            }
        }
        Ok(report)
    }

    async fn record_on_registry(
        &self,
        collectible_id: &str,
        user: &UserId,
        create_missing: bool,
    ) -> Result<UnlockOutcome, StoreError> {
        let key = format!("{}/{}", collections::ACHIEVEMENTS, collectible_id);
        let _guard = self.locks.lock(&key).await;

        let mut last_conflict = None;
        for _ in 0..self.max_retries {
            let now = Utc::now();
            let (mut collectible, version) =
                match fetch::<Collectible>(&*self.store, collections::ACHIEVEMENTS, collectible_id)
                    .await
                {
                    Ok(found) => found,
                    Err(e) if e.is_not_found() && create_missing => {
                        let mut collectible = Collectible::new(collectible_id);
                        collectible.record_unlock(user, now);
                        match self
                            .store
                            .create(collections::ACHIEVEMENTS, collectible_id, encode(&collectible)?)
                            .await
                        {
                            Ok(_) => return Ok(UnlockOutcome::Unlocked(now)),
                            Err(StoreError::AlreadyExists { .. }) => continue,
                            Err(e) => return Err(e),
                        }
                    }
                    Err(e) => return Err(e),
                };

            if let Some(at) = collectible.unlock_date(user) {
                return Ok(UnlockOutcome::AlreadyUnlocked(at));
            }
            collectible.record_unlock(user, now);
            let fields = pick(encode(&collectible)?, &["unlockedBy"]);
            match self
                .store
                .update_if(collections::ACHIEVEMENTS, collectible_id, version, fields)
                .await
            {
                Ok(_) => return Ok(UnlockOutcome::Unlocked(now)),
                Err(e) if e.is_conflict() => last_conflict = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_conflict
            .unwrap_or_else(|| StoreError::Unavailable(format!("{key} kept changing"))))
    }

    async fn record_on_user(&self, collectible_id: &str, user: &UserId) -> Result<(), StoreError> {
        let mut last_conflict = None;
        for _ in 0..self.max_retries {
            let (mut account, version) =
                fetch::<User>(&*self.store, collections::USERS, user.as_str()).await?;
            if account.has_achievement(collectible_id) {
                return Ok(());
            }
            account.achievement_ids.push(collectible_id.to_string());
            let fields = pick(encode(&account)?, &["achievementIds"]);
            match self
                .store
                .update_if(collections::USERS, user.as_str(), version, fields)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() => last_conflict = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_conflict.unwrap_or_else(|| {
            StoreError::Unavailable(format!("users/{user} kept changing"))
        }))
    }
}
