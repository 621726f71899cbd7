//! Handler reports
//!
//! Handlers swallow per-quest failures; these types carry them back to the
//! caller instead so partial success can be inspected.

use crate::achievements::UnlockOutcome;
use crate::domain::ProgressChange;
use crate::error::{LedgerError, ProgressError, StoreError};
use crate::ledger::Credit;

/// Why a handler did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// The user is not listed on the quiz or event
    NotParticipant,
    /// A removal was reported but the user is still listed on the event
    StillParticipant,
    /// The registry does not list the user for the collectible
    NotUnlocked,
    NonPositiveAmount,
}

/// A successful write (or deliberate no-op) on one quest
#[derive(Debug)]
pub struct QuestUpdate {
    pub change: ProgressChange,
    /// Completion reward, when this update completed the quest or repaired a missing reward
    pub reward: Option<Result<Credit, LedgerError>>,
}

impl QuestUpdate {
    pub(crate) fn unchanged(change: ProgressChange) -> Self {
        Self {
            change,
            reward: None,
        }
    }
}

#[derive(Debug)]
pub struct QuestOutcome {
    pub quest_id: String,
    pub result: Result<QuestUpdate, ProgressError>,
}

impl QuestOutcome {
    pub fn change(&self) -> Option<ProgressChange> {
        self.result.as_ref().ok().map(|u| u.change)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.change(), Some(ProgressChange::Completed { .. }))
    }
}

/// Everything one handler call did
#[derive(Debug, Default)]
pub struct ProgressReport {
    pub skipped: Option<Skip>,
    /// Failures that stopped a whole step (loading the quiz, listing quests, ...)
    pub errors: Vec<ProgressError>,
    pub quests: Vec<QuestOutcome>,
    /// Collectible granted by a quiz
    pub achievement: Option<Result<UnlockOutcome, StoreError>>,
    /// Points credited for the triggering event
    pub credit: Option<Result<Credit, LedgerError>>,
}

impl ProgressReport {
    pub(crate) fn skipped(reason: Skip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub(crate) fn failed(error: impl Into<ProgressError>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    /// Quest for `quest_id`, if this report touched it
    pub fn quest(&self, quest_id: &str) -> Option<&QuestOutcome> {
        self.quests.iter().find(|q| q.quest_id == quest_id)
    }

    /// Ids of quests completed by this call
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.quests
            .iter()
            .filter(|q| q.is_completed())
            .map(|q| q.quest_id.as_str())
    }

    pub fn failed_quests(&self) -> impl Iterator<Item = &QuestOutcome> {
        self.quests.iter().filter(|q| q.result.is_err())
    }

    /// No step failed (skips and no-ops count as clean)
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self.failed_quests().next().is_none()
            && !self.achievement.as_ref().is_some_and(Result::is_err)
            && !self.credit.as_ref().is_some_and(Result::is_err)
            && !self
                .quests
                .iter()
                .filter_map(|q| q.result.as_ref().ok())
                .any(|u| u.reward.as_ref().is_some_and(Result::is_err))
    }

    pub(crate) fn merge(&mut self, other: ProgressReport) {
        self.errors.extend(other.errors);
        self.quests.extend(other.quests);
    }
}
