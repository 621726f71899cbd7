//! Ledger Engine - per-user points balance with an append-only history
//!
//! Every posting is a read, a balance check and a conditional write of the
//! `users/{id}` document: `points` and `pointsHistory` change together or not
//! at all. Postings for one user are serialized in-process, and a version
//! conflict from another writer makes the posting re-read and retry.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, info};

use crate::config::Config;
use crate::domain::{Source, Transaction, TransactionType, User, UserId};
use crate::error::{LedgerError, StoreError};
use crate::locks::KeyedLocks;
use crate::store::{DocumentStore, collections, encode, fetch, pick};

/// Reference carried by the welcome grant
const INITIAL_REFERENCE: &str = "initial";

/// A transaction that was written, with the balance right after it
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub transaction: Transaction,
    pub balance: i64,
}

/// Outcome of an idempotent credit
#[derive(Debug, Clone, PartialEq)]
pub enum Credit {
    Posted(Posting),
    /// A transaction with the same reference already exists
    AlreadyRecorded,
}

impl Credit {
    pub fn is_posted(&self) -> bool {
        matches!(self, Self::Posted(_))
    }
}

/// Whether a transaction counts toward "points earned"
///
/// Credits only, excluding the welcome grant, quest completion rewards and
/// ticket refunds.
pub fn counts_as_earned(tx: &Transaction) -> bool {
    tx.is_credit()
        && tx.kind != TransactionType::Initial
        && !tx
            .reference
            .as_deref()
            .is_some_and(|r| Source::is_quest_reward(r) || Source::is_refund(r))
}

/// Total points earned according to the user's history
pub fn earned_points_of(account: &User) -> i64 {
    account
        .points_history
        .iter()
        .filter(|tx| counts_as_earned(tx))
        .map(|tx| tx.amount)
        .sum()
}

/// Per-user points ledger
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    locks: KeyedLocks,
    initial_bonus: i64,
    max_retries: u32,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::from_config(store, &Config::default())
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            initial_bonus: config.points.initial_bonus,
            max_retries: config.engine.max_write_retries.max(1),
        }
    }

    /// Create an empty `users/{id}` document. Returns false if it already exists.
    pub async fn ensure_user(&self, user: &UserId) -> Result<bool, StoreError> {
        let fields = encode(&User::new(user.clone()))?;
        match self.store.create(collections::USERS, user.as_str(), fields).await {
            Ok(_) => {
                debug!(user = %user, "Created user document");
                Ok(true)
            }
            Err(StoreError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Grant the welcome bonus once. No-op (false) when the history is not empty.
    pub async fn setup_initial_points(&self, user: &UserId) -> Result<bool, LedgerError> {
        if self.initial_bonus <= 0 {
            return Err(LedgerError::InvalidAmount(self.initial_bonus));
        }
        self.ensure_user(user).await?;

        let (account, _) = fetch::<User>(&*self.store, collections::USERS, user.as_str()).await?;
        if !account.points_history.is_empty() {
            debug!(user = %user, "User already has a history, skipping welcome bonus");
            return Ok(false);
        }

        let entry = Transaction::new(
            user,
            self.initial_bonus,
            TransactionType::Initial,
            "Welcome bonus points",
        )
        .with_reference(Some(INITIAL_REFERENCE.to_string()));
        Ok(self.post(user, entry).await?.is_some())
    }

    pub async fn add_points(
        &self,
        user: &UserId,
        amount: i64,
        kind: TransactionType,
        description: &str,
    ) -> Result<Posting, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let entry = Transaction::new(user, amount, kind, description);
        self.post(user, entry)
            .await?
            .ok_or_else(|| LedgerError::Store(StoreError::Unavailable("credit not posted".into())))
    }

    /// Credit at most once per `reference`
    pub async fn add_points_once(
        &self,
        user: &UserId,
        amount: i64,
        kind: TransactionType,
        description: &str,
        reference: &Source,
    ) -> Result<Credit, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let entry =
            Transaction::new(user, amount, kind, description).with_reference(Some(reference.key()));
        Ok(match self.post(user, entry).await? {
            Some(posting) => Credit::Posted(posting),
            None => {
                debug!(user = %user, reference = %reference, "Credit already recorded");
                Credit::AlreadyRecorded
            }
        })
    }

    /// Debit `amount`. Fails with `InsufficientFunds` and writes nothing if the balance is short.
    pub async fn spend_points(
        &self,
        user: &UserId,
        amount: i64,
        kind: TransactionType,
        description: &str,
    ) -> Result<Posting, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let entry = Transaction::new(user, -amount, kind, description);
        self.post(user, entry)
            .await?
            .ok_or_else(|| LedgerError::Store(StoreError::Unavailable("debit not posted".into())))
    }

    pub async fn get_balance(&self, user: &UserId) -> Result<i64, LedgerError> {
        Ok(self.account(user).await?.points)
    }

    /// History, newest first
    pub async fn get_history(&self, user: &UserId) -> Result<Vec<Transaction>, LedgerError> {
        let mut history = self.account(user).await?.points_history;
        // Reverse first so equal timestamps keep newest-first after the stable sort
        history.reverse();
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(history)
    }

    /// Points earned so far (see [`counts_as_earned`]) with the references that contributed
    pub async fn earned_points(&self, user: &UserId) -> Result<(i64, Vec<String>), LedgerError> {
        let account = self.account(user).await?;
        let references = account
            .points_history
            .iter()
            .filter(|tx| counts_as_earned(tx))
            .filter_map(|tx| tx.reference.clone())
            .collect();
        Ok((earned_points_of(&account), references))
    }

    pub async fn account(&self, user: &UserId) -> Result<User, LedgerError> {
        let (account, _) = fetch::<User>(&*self.store, collections::USERS, user.as_str()).await?;
        Ok(account)
    }

    /// Balance after every change to the user's document
    pub fn watch_balance(&self, user: &UserId) -> BoxStream<'static, i64> {
        self.store
            .listen(collections::USERS, Some(user.as_str()))
            .filter_map(|change| {
                let points = change.document.fields.get("points").and_then(|v| v.as_i64());
                futures::future::ready(points)
            })
            .boxed()
    }

    /// Append `entry` and move the balance. `None` when its reference is already recorded.
    async fn post(&self, user: &UserId, entry: Transaction) -> Result<Option<Posting>, LedgerError> {
        let _guard = self.locks.lock(user.as_str()).await;

        for attempt in 1..=self.max_retries {
            let (mut account, version) =
                fetch::<User>(&*self.store, collections::USERS, user.as_str()).await?;

            if let Some(reference) = &entry.reference {
                if account.has_reference(reference) {
                    return Ok(None);
                }
            }
            if entry.amount < 0 && account.points < -entry.amount {
                return Err(LedgerError::InsufficientFunds {
                    balance: account.points,
                    requested: -entry.amount,
                });
            }

            account.points += entry.amount;
            account.points_history.push(entry.clone());
            let fields = pick(encode(&account)?, &["points", "pointsHistory"]);

            match self
                .store
                .update_if(collections::USERS, user.as_str(), version, fields)
                .await
            {
                Ok(_) => {
                    info!(
                        user = %user,
                        amount = entry.amount,
                        kind = %entry.kind,
                        balance = account.points,
                        "Posted points transaction"
                    );
                    return Ok(Some(Posting {
                        transaction: entry,
                        balance: account.points,
                    }));
                }
                Err(e) if e.is_conflict() => {
                    debug!(user = %user, attempt, "Ledger write conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Contention {
            user_id: user.to_string(),
            attempts: self.max_retries,
        })
    }
}
