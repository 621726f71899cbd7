//! Progress Engine - turns game events into quest progress
//!
//! Four handlers feed quests of the matching requirement kind:
//!
//! | Handler | Requirement | Amount | Source key |
//! |---|---|---|---|
//! | [`QuestProgress::handle_quiz_completion`] | `quizCompletion` | 1 | `quiz:<id>` |
//! | [`QuestProgress::handle_event_participation`] | `eventParticipation` | 1 | `event:<id>` |
//! | [`QuestProgress::handle_achievement_unlock`] | `achievementCollection` | 1 | `achievement:<id>` |
//! | [`QuestProgress::handle_points_earned`] | `pointsEarned` | points | caller's |
//!
//! A source key is counted at most once per (quest, user), so replayed events
//! are harmless. Completion is written in the same conditional update as the
//! increment that crossed the threshold; the reward is then credited under the
//! `quest:<id>` reference, which makes it at-most-once as well.
//!
//! Handlers never return errors. Per-quest failures are logged and collected
//! into a [`ProgressReport`].

mod catalog;
mod report;

pub use catalog::{DEFAULT_QUESTS, QuestTemplate, publish_default_quests};
pub use report::{ProgressReport, QuestOutcome, QuestUpdate, Skip};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::achievements::Achievements;
use crate::config::Config;
use crate::domain::{
    Event, ProgressChange, Quest, Quiz, RequirementKind, Source, TransactionType, UserId,
};
use crate::error::{LedgerError, ProgressError, StoreError};
use crate::ledger::{Credit, Ledger};
use crate::locks::KeyedLocks;
use crate::store::{DocumentStore, collections, encode, fetch, fetch_all, pick};

/// Quest fields owned by this engine
const PROGRESS_FIELDS: &[&str] = &[
    "participants",
    "completedBy",
    "progress",
    "userProgress",
    "userSources",
];

pub struct QuestProgress {
    store: Arc<dyn DocumentStore>,
    ledger: Arc<Ledger>,
    achievements: Arc<Achievements>,
    locks: KeyedLocks,
    max_retries: u32,
}

impl QuestProgress {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ledger: Arc<Ledger>,
        achievements: Arc<Achievements>,
    ) -> Self {
        Self::from_config(store, ledger, achievements, &Config::default())
    }

    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        ledger: Arc<Ledger>,
        achievements: Arc<Achievements>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            ledger,
            achievements,
            locks: KeyedLocks::new(),
            max_retries: config.engine.max_write_retries.max(1),
        }
    }

    /// Every published quest, ordered by id
    pub async fn quests(&self) -> Result<Vec<Quest>, StoreError> {
        fetch_all(&*self.store, collections::QUESTS).await
    }

    /// A correct quiz answer: quiz quests, the quiz's collectible, its points and points quests
    pub async fn handle_quiz_completion(&self, user: &UserId, quiz_id: &str) -> ProgressReport {
        let quiz = match fetch::<Quiz>(&*self.store, collections::QUIZZES, quiz_id).await {
            Ok((quiz, _)) => quiz,
            Err(e) => {
                error!(user = %user, quiz = quiz_id, error = %e, "Failed to load quiz");
                return ProgressReport::failed(e);
            }
        };
        if !quiz.has_participant(user) {
            debug!(user = %user, quiz = quiz_id, "User has not answered this quiz");
            return ProgressReport::skipped(Skip::NotParticipant);
        }

        let source = Source::Quiz(quiz.id.clone());
        let mut report = ProgressReport::default();
        self.advance_all(
            RequirementKind::QuizCompletion,
            user,
            1,
            Some(&source),
            &mut report,
        )
        .await;

        if let Some(achievement_id) = &quiz.achievement_id {
            let unlocked = self.achievements.unlock(achievement_id, user).await;
            match &unlocked {
                Ok(_) => {
                    let nested = self.handle_achievement_unlock(user, achievement_id).await;
                    report.merge(nested);
                }
                Err(e) => {
                    warn!(user = %user, collectible = %achievement_id, error = %e, "Quiz achievement unlock failed")
                }
            }
            report.achievement = Some(unlocked);
        }

        if quiz.points > 0 {
            let credit = self
                .ledger
                .add_points_once(
                    user,
                    quiz.points,
                    TransactionType::Reward,
                    &format!("Completed quiz: {}", quiz.question),
                    &source,
                )
                .await;
            match &credit {
                Ok(_) => {
                    let nested = self
                        .handle_points_earned(user, quiz.points, Some(&source))
                        .await;
                    report.merge(nested);
                }
                Err(e) => warn!(user = %user, quiz = quiz_id, error = %e, "Quiz points credit failed"),
            }
            report.credit = Some(credit);
        }

        report
    }

    /// The user joined `event_id`
    pub async fn handle_event_participation(&self, user: &UserId, event_id: &str) -> ProgressReport {
        let event = match self.load_event(user, event_id).await {
            Ok(event) => event,
            Err(report) => return report,
        };
        if !event.has_participant(user) {
            debug!(user = %user, event = event_id, "User is not a participant");
            return ProgressReport::skipped(Skip::NotParticipant);
        }

        let mut report = ProgressReport::default();
        let source = Source::Event(event.id);
        self.advance_all(
            RequirementKind::EventParticipation,
            user,
            1,
            Some(&source),
            &mut report,
        )
        .await;
        report
    }

    /// The user left `event_id`. Progress goes down by one, never below zero.
    pub async fn handle_event_participation_removal(
        &self,
        user: &UserId,
        event_id: &str,
    ) -> ProgressReport {
        let event = match self.load_event(user, event_id).await {
            Ok(event) => event,
            Err(report) => return report,
        };
        if event.has_participant(user) {
            debug!(user = %user, event = event_id, "User still participates, nothing to remove");
            return ProgressReport::skipped(Skip::StillParticipant);
        }

        let mut report = ProgressReport::default();
        let Some(quests) = self.load_quests(&mut report).await else {
            return report;
        };
        let source = Source::Event(event.id);
        let now = Utc::now();
        for quest in quests.iter().filter(|q| {
            q.requirement.kind() == RequirementKind::EventParticipation
                && q.is_active_at(now)
                && !q.is_completed_by(user)
        }) {
            let result = self
                .retreat_quest_progress(&quest.id, user, Some(&source))
                .await;
            record(&mut report, user, &quest.id, result);
        }
        report
    }

    /// A collectible was unlocked. Only counted when the registry lists the user.
    pub async fn handle_achievement_unlock(
        &self,
        user: &UserId,
        achievement_id: &str,
    ) -> ProgressReport {
        match self.achievements.is_unlocked_by(achievement_id, user).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(user = %user, collectible = achievement_id, "Not unlocked, nothing to count");
                return ProgressReport::skipped(Skip::NotUnlocked);
            }
            Err(e) => {
                error!(user = %user, collectible = achievement_id, error = %e, "Failed to check unlock");
                return ProgressReport::failed(e);
            }
        }

        let mut report = ProgressReport::default();
        let source = Source::Achievement(achievement_id.to_string());
        self.advance_all(
            RequirementKind::AchievementCollection,
            user,
            1,
            Some(&source),
            &mut report,
        )
        .await;
        report
    }

    /// Points were earned. Feeds `pointsEarned` quests with the literal amount.
    pub async fn handle_points_earned(
        &self,
        user: &UserId,
        amount: i64,
        source: Option<&Source>,
    ) -> ProgressReport {
        if amount <= 0 {
            return ProgressReport::skipped(Skip::NonPositiveAmount);
        }
        let mut report = ProgressReport::default();
        self.advance_all(RequirementKind::PointsEarned, user, amount, source, &mut report)
            .await;
        report
    }

    /// Add `amount` to one quest for `user`, completing and rewarding on the crossing call
    pub async fn update_quest_progress(
        &self,
        quest_id: &str,
        user: &UserId,
        amount: i64,
        source: Option<&Source>,
    ) -> Result<QuestUpdate, ProgressError> {
        let key = source.map(Source::key);
        self.write_quest(quest_id, user, |quest| {
            quest.apply_increment(user, amount, key.as_deref())
        })
        .await
    }

    /// Take one unit back from one quest for `user`
    pub async fn retreat_quest_progress(
        &self,
        quest_id: &str,
        user: &UserId,
        source: Option<&Source>,
    ) -> Result<QuestUpdate, ProgressError> {
        let key = source.map(Source::key);
        self.write_quest(quest_id, user, |quest| {
            quest.apply_decrement(user, key.as_deref())
        })
        .await
    }

    /// Catch-up: set every active quest's progress from the user's current history
    ///
    /// Safe to run any number of times. Quests the user already completed are
    /// left alone, except that a missing completion reward is issued.
    pub async fn initialize_quest_progress(&self, user: &UserId) -> ProgressReport {
        let account = match self.ledger.account(user).await {
            Ok(account) => account,
            Err(e) => {
                error!(user = %user, error = %e, "Failed to load user for quest catch-up");
                return ProgressReport::failed(e);
            }
        };

        let mut report = ProgressReport::default();
        let Some(quests) = self.load_quests(&mut report).await else {
            return report;
        };

        let now = Utc::now();
        let mut derived: HashMap<RequirementKind, Option<(i64, Vec<String>)>> = HashMap::new();
        for quest in quests {
            if quest.is_completed_by(user) {
                let reference = Source::Quest(quest.id.clone()).key();
                if quest.points > 0 && !account.has_reference(&reference) {
                    info!(user = %user, quest = %quest.id, "Issuing missing quest reward");
                    let reward = self.reward(&quest, user).await;
                    report.quests.push(QuestOutcome {
                        quest_id: quest.id.clone(),
                        result: Ok(QuestUpdate {
                            change: ProgressChange::AlreadyCompleted,
                            reward,
                        }),
                    });
                }
                continue;
            }
            if !quest.is_active_at(now) {
                continue;
            }

            let kind = quest.requirement.kind();
            if !derived.contains_key(&kind) {
                let value = match self.derive(kind, user).await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(user = %user, kind = kind.as_str(), error = %e, "Failed to derive progress");
                        report.errors.push(e);
                        None
                    }
                };
                derived.insert(kind, value);
            }
            let Some(Some((value, sources))) = derived.get(&kind) else {
                continue;
            };
            let (value, sources) = (*value, sources.clone());

            let result = self
                .write_quest(&quest.id, user, |q| {
                    q.apply_recompute(user, value, sources.clone())
                })
                .await;
            record(&mut report, user, &quest.id, result);
        }

        info!(
            user = %user,
            quests = report.quests.len(),
            completed = report.completed().count(),
            "Quest catch-up finished"
        );
        report
    }

    /// Current value and counted sources for `kind`, from authoritative history
    async fn derive(
        &self,
        kind: RequirementKind,
        user: &UserId,
    ) -> Result<(i64, Vec<String>), ProgressError> {
        let sources: Vec<String> = match kind {
            RequirementKind::QuizCompletion => {
                fetch_all::<Quiz>(&*self.store, collections::QUIZZES)
                    .await?
                    .into_iter()
                    .filter(|quiz| quiz.has_participant(user))
                    .map(|quiz| Source::Quiz(quiz.id).key())
                    .collect()
            }
            RequirementKind::EventParticipation => {
                fetch_all::<Event>(&*self.store, collections::EVENTS)
                    .await?
                    .into_iter()
                    .filter(|event| event.has_participant(user))
                    .map(|event| Source::Event(event.id).key())
                    .collect()
            }
            RequirementKind::AchievementCollection => self
                .achievements
                .unlocked_by(user)
                .await?
                .into_iter()
                .map(|id| Source::Achievement(id).key())
                .collect(),
            RequirementKind::PointsEarned => {
                return Ok(self.ledger.earned_points(user).await?);
            }
        };
        Ok((sources.len() as i64, sources))
    }

    async fn advance_all(
        &self,
        kind: RequirementKind,
        user: &UserId,
        amount: i64,
        source: Option<&Source>,
        report: &mut ProgressReport,
    ) {
        let Some(quests) = self.load_quests(report).await else {
            return;
        };
        let now = Utc::now();
        for quest in quests.iter().filter(|q| {
            q.requirement.kind() == kind && q.is_active_at(now) && !q.is_completed_by(user)
        }) {
            let result = self
                .update_quest_progress(&quest.id, user, amount, source)
                .await;
            record(report, user, &quest.id, result);
        }
    }

    /// Decode every quest. Undecodable ones are reported and left out.
    async fn load_quests(&self, report: &mut ProgressReport) -> Option<Vec<Quest>> {
        let docs = match self.store.list(collections::QUESTS).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "Failed to list quests");
                report.errors.push(e.into());
                return None;
            }
        };

        let mut quests = Vec::with_capacity(docs.len());
        for doc in docs {
            match doc.decode::<Quest>() {
                Ok(quest) => quests.push(quest),
                Err(e) => {
                    warn!(quest = %doc.id, error = %e, "Skipping unreadable quest");
                    report.quests.push(QuestOutcome {
                        quest_id: doc.id,
                        result: Err(e.into()),
                    });
                }
            }
        }
        Some(quests)
    }

    async fn load_event(&self, user: &UserId, event_id: &str) -> Result<Event, ProgressReport> {
        fetch::<Event>(&*self.store, collections::EVENTS, event_id)
            .await
            .map(|(event, _)| event)
            .map_err(|e| {
                error!(user = %user, event = event_id, error = %e, "Failed to load event");
                ProgressReport::failed(e)
            })
    }

    /// Read, apply `change`, conditionally write back. Rewards on completion.
    async fn write_quest<F>(
        &self,
        quest_id: &str,
        user: &UserId,
        mut change: F,
    ) -> Result<QuestUpdate, ProgressError>
    where
        F: FnMut(&mut Quest) -> ProgressChange + Send,
    {
        let key = format!("{}/{}", collections::QUESTS, quest_id);
        let _guard = self.locks.lock(&key).await;

        for attempt in 1..=self.max_retries {
            let (mut quest, version) =
                fetch::<Quest>(&*self.store, collections::QUESTS, quest_id).await?;
            let outcome = change(&mut quest);
            if !outcome.is_write() {
                debug!(user = %user, quest = quest_id, change = ?outcome, "Quest progress unchanged");
                return Ok(QuestUpdate::unchanged(outcome));
            }

            let fields = pick(encode(&quest)?, PROGRESS_FIELDS);
            match self
                .store
                .update_if(collections::QUESTS, quest_id, version, fields)
                .await
            {
                Ok(_) => {
                    let reward = match outcome {
                        ProgressChange::Completed { .. } => {
                            info!(user = %user, quest = quest_id, points = quest.points, "Quest completed");
                            self.reward(&quest, user).await
                        }
                        _ => {
                            debug!(user = %user, quest = quest_id, change = ?outcome, "Quest progress written");
                            None
                        }
                    };
                    return Ok(QuestUpdate {
                        change: outcome,
                        reward,
                    });
                }
                Err(e) if e.is_conflict() => {
                    debug!(quest = quest_id, attempt, "Quest write conflicted, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProgressError::Contention {
            quest_id: quest_id.to_string(),
            attempts: self.max_retries,
        })
    }

    /// Credit the completion reward once per (quest, user)
    async fn reward(&self, quest: &Quest, user: &UserId) -> Option<Result<Credit, LedgerError>> {
        if quest.points <= 0 {
            return None;
        }
        let result = self
            .ledger
            .add_points_once(
                user,
                quest.points,
                TransactionType::Reward,
                &format!("Completed quest: {}", quest.title),
                &Source::Quest(quest.id.clone()),
            )
            .await;
        if let Err(e) = &result {
            warn!(user = %user, quest = %quest.id, error = %e, "Quest reward not credited");
        }
        Some(result)
    }
}

fn record(
    report: &mut ProgressReport,
    user: &UserId,
    quest_id: &str,
    result: Result<QuestUpdate, ProgressError>,
) {
    if let Err(e) = &result {
        warn!(user = %user, quest = quest_id, error = %e, "Quest progress update failed");
    }
    report.quests.push(QuestOutcome {
        quest_id: quest_id.to_string(),
        result,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QuestRequirement, QuestState};
    use crate::store::InMemoryStore;
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        ledger: Arc<Ledger>,
        achievements: Arc<Achievements>,
        progress: QuestProgress,
        user: UserId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let shared: Arc<dyn DocumentStore> = store.clone();
        let ledger = Arc::new(Ledger::new(Arc::clone(&shared)));
        let achievements = Arc::new(Achievements::new(Arc::clone(&shared)));
        let progress = QuestProgress::new(shared, Arc::clone(&ledger), Arc::clone(&achievements));
        let user = UserId::new("u1");
        ledger.setup_initial_points(&user).await.unwrap();
        Fixture {
            store,
            ledger,
            achievements,
            progress,
            user,
        }
    }

    impl Fixture {
        async fn publish(&self, id: &str, points: i64, requirement: QuestRequirement) {
            let now = Utc::now();
            let quest = Quest::new(
                id,
                id,
                points,
                requirement,
                now - Duration::days(1),
                now + Duration::days(1),
            );
            self.store
                .create(collections::QUESTS, id, encode(&quest).unwrap())
                .await
                .unwrap();
        }

        async fn answered_quiz(&self, id: &str, achievement_id: Option<&str>) {
            let quiz = Quiz {
                id: id.to_string(),
                user_id: UserId::new("author"),
                question: format!("Question {id}"),
                answers: vec!["a".into(), "b".into()],
                correct_answer_index: 0,
                points: 10,
                participants: vec![self.user.clone()],
                created_at: Utc::now(),
                achievement_id: achievement_id.map(str::to_string),
            };
            self.store
                .set(collections::QUIZZES, id, encode(&quiz).unwrap())
                .await
                .unwrap();
        }

        async fn event_with(&self, id: &str, participants: Vec<UserId>) {
            let event = Event {
                id: id.to_string(),
                user_id: UserId::new("organizer"),
                title: id.to_string(),
                description: String::new(),
                location: String::new(),
                date: Utc::now() + Duration::days(3),
                price: 0,
                participants,
                created_at: Utc::now(),
            };
            self.store
                .set(collections::EVENTS, id, encode(&event).unwrap())
                .await
                .unwrap();
        }

        async fn quest(&self, id: &str) -> Quest {
            fetch::<Quest>(&*self.store, collections::QUESTS, id)
                .await
                .unwrap()
                .0
        }

        async fn balance(&self) -> i64 {
            self.ledger.get_balance(&self.user).await.unwrap()
        }

        async fn reward_count(&self, quest_id: &str) -> usize {
            let reference = Source::Quest(quest_id.to_string()).key();
            self.ledger
                .account(&self.user)
                .await
                .unwrap()
                .points_history
                .iter()
                .filter(|t| t.reference.as_deref() == Some(reference.as_str()))
                .count()
        }
    }

    #[tokio::test]
    async fn test_fifth_quiz_completes_and_rewards_once() {
        let f = fixture().await;
        f.publish("quick-learner", 75, QuestRequirement::QuizCompletion(5))
            .await;

        for i in 1..=4 {
            let id = format!("quiz-{i}");
            f.answered_quiz(&id, None).await;
            let report = f.progress.handle_quiz_completion(&f.user, &id).await;
            assert!(report.is_clean());
        }
        let quest = f.quest("quick-learner").await;
        assert_eq!(quest.progress_for(&f.user), 4);
        assert!(!quest.is_completed_by(&f.user));
        assert_eq!(f.reward_count("quick-learner").await, 0);
        assert_eq!(f.balance().await, 90);

        f.answered_quiz("quiz-5", None).await;
        let report = f.progress.handle_quiz_completion(&f.user, "quiz-5").await;
        assert_eq!(report.completed().collect::<Vec<_>>(), vec!["quick-learner"]);

        let quest = f.quest("quick-learner").await;
        assert_eq!(quest.progress_for(&f.user), 5);
        assert_eq!(quest.state_for(&f.user), QuestState::Completed);
        assert_eq!(f.reward_count("quick-learner").await, 1);
        assert_eq!(f.balance().await, 175);

        // Replays change nothing
        let replay = f.progress.handle_quiz_completion(&f.user, "quiz-5").await;
        assert!(replay.quest("quick-learner").is_none());
        assert!(matches!(replay.credit, Some(Ok(Credit::AlreadyRecorded))));
        f.answered_quiz("quiz-6", None).await;
        f.progress.handle_quiz_completion(&f.user, "quiz-6").await;

        assert_eq!(f.quest("quick-learner").await.progress_for(&f.user), 5);
        assert_eq!(f.reward_count("quick-learner").await, 1);
        assert_eq!(f.balance().await, 185);
    }

    #[tokio::test]
    async fn test_replayed_quiz_counts_once() {
        let f = fixture().await;
        f.publish("champion", 100, QuestRequirement::QuizCompletion(10))
            .await;
        f.answered_quiz("capitals", None).await;

        f.progress.handle_quiz_completion(&f.user, "capitals").await;
        let replay = f.progress.handle_quiz_completion(&f.user, "capitals").await;

        assert_eq!(
            replay.quest("champion").and_then(QuestOutcome::change),
            Some(ProgressChange::AlreadyCounted)
        );
        assert_eq!(f.quest("champion").await.progress_for(&f.user), 1);
        assert_eq!(f.balance().await, 60);
    }

    #[tokio::test]
    async fn test_non_participant_is_skipped() {
        let f = fixture().await;
        f.publish("champion", 100, QuestRequirement::QuizCompletion(10))
            .await;
        f.answered_quiz("capitals", None).await;

        let other = UserId::new("u2");
        f.ledger.setup_initial_points(&other).await.unwrap();
        let report = f.progress.handle_quiz_completion(&other, "capitals").await;

        assert_eq!(report.skipped, Some(Skip::NotParticipant));
        assert!(report.credit.is_none());
        assert_eq!(f.ledger.get_balance(&other).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_missing_quiz_is_reported() {
        let f = fixture().await;
        let report = f.progress.handle_quiz_completion(&f.user, "nope").await;
        assert_eq!(report.errors.len(), 1);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_points_quest_completes_on_crossing_call() {
        let f = fixture().await;
        f.publish("points-hunter", 300, QuestRequirement::PointsEarned(1000))
            .await;

        let report = f.progress.handle_points_earned(&f.user, 999, None).await;
        assert_eq!(
            report.quest("points-hunter").and_then(QuestOutcome::change),
            Some(ProgressChange::Advanced { progress: 999 })
        );
        assert_eq!(f.reward_count("points-hunter").await, 0);

        let report = f.progress.handle_points_earned(&f.user, 1, None).await;
        assert_eq!(
            report.quest("points-hunter").and_then(QuestOutcome::change),
            Some(ProgressChange::Completed { progress: 1000 })
        );
        assert_eq!(f.reward_count("points-hunter").await, 1);
        assert_eq!(f.balance().await, 350);

        let skipped = f.progress.handle_points_earned(&f.user, 0, None).await;
        assert_eq!(skipped.skipped, Some(Skip::NonPositiveAmount));
    }

    #[tokio::test]
    async fn test_quest_failure_does_not_block_credit() {
        let f = fixture().await;
        f.publish("champion", 100, QuestRequirement::QuizCompletion(10))
            .await;
        f.publish("quick", 75, QuestRequirement::QuizCompletion(5))
            .await;
        f.answered_quiz("capitals", None).await;
        f.store.fail_writes(collections::QUESTS, Some("champion"));

        let report = f.progress.handle_quiz_completion(&f.user, "capitals").await;

        assert_eq!(report.failed_quests().count(), 1);
        assert_eq!(
            report.quest("quick").and_then(QuestOutcome::change),
            Some(ProgressChange::Advanced { progress: 1 })
        );
        assert!(matches!(report.credit, Some(Ok(Credit::Posted(_)))));
        assert!(!report.is_clean());
        assert_eq!(f.balance().await, 60);
    }

    #[tokio::test]
    async fn test_join_leave_join_restores_progress() {
        let f = fixture().await;
        f.publish("explorer", 150, QuestRequirement::EventParticipation(5))
            .await;

        f.event_with("bbq", vec![f.user.clone()]).await;
        f.progress.handle_event_participation(&f.user, "bbq").await;
        let after_join = f.quest("explorer").await.progress_for(&f.user);
        assert_eq!(after_join, 1);

        let still_there = f
            .progress
            .handle_event_participation_removal(&f.user, "bbq")
            .await;
        assert_eq!(still_there.skipped, Some(Skip::StillParticipant));

        f.event_with("bbq", vec![]).await;
        let left = f
            .progress
            .handle_event_participation_removal(&f.user, "bbq")
            .await;
        assert_eq!(
            left.quest("explorer").and_then(QuestOutcome::change),
            Some(ProgressChange::Retreated { progress: 0 })
        );
        let again = f
            .progress
            .handle_event_participation_removal(&f.user, "bbq")
            .await;
        assert_eq!(
            again.quest("explorer").and_then(QuestOutcome::change),
            Some(ProgressChange::NotCounted)
        );

        f.event_with("bbq", vec![f.user.clone()]).await;
        f.progress.handle_event_participation(&f.user, "bbq").await;
        assert_eq!(f.quest("explorer").await.progress_for(&f.user), after_join);
    }

    #[tokio::test]
    async fn test_quiz_achievement_feeds_collection_quests() {
        let f = fixture().await;
        f.achievements.seed(&f.user, &[]).await.unwrap();
        f.publish("flag-collector", 200, QuestRequirement::AchievementCollection(8))
            .await;
        f.answered_quiz("flags", Some("DE")).await;

        let report = f.progress.handle_quiz_completion(&f.user, "flags").await;

        assert!(matches!(report.achievement, Some(Ok(ref o)) if o.is_new()));
        assert_eq!(f.quest("flag-collector").await.progress_for(&f.user), 1);

        // Unlocking by hand afterwards reports the same collectible, counted once
        let manual = f.progress.handle_achievement_unlock(&f.user, "DE").await;
        assert_eq!(
            manual.quest("flag-collector").and_then(QuestOutcome::change),
            Some(ProgressChange::AlreadyCounted)
        );
        let locked = f.progress.handle_achievement_unlock(&f.user, "FR").await;
        assert_eq!(locked.skipped, Some(Skip::NotUnlocked));
    }

    #[tokio::test]
    async fn test_catch_up_sets_progress_from_history() {
        let f = fixture().await;
        for id in ["a", "b", "c"] {
            f.answered_quiz(id, None).await;
            f.progress.handle_quiz_completion(&f.user, id).await;
        }
        f.publish("champion", 100, QuestRequirement::QuizCompletion(10))
            .await;
        f.publish("points-hunter", 300, QuestRequirement::PointsEarned(1000))
            .await;

        let report = f.progress.initialize_quest_progress(&f.user).await;
        assert!(report.is_clean());
        assert_eq!(f.quest("champion").await.progress_for(&f.user), 3);
        assert_eq!(f.quest("points-hunter").await.progress_for(&f.user), 30);

        let again = f.progress.initialize_quest_progress(&f.user).await;
        assert_eq!(
            again.quest("champion").and_then(QuestOutcome::change),
            Some(ProgressChange::Unchanged)
        );

        // A live replay of a quiz the catch-up already counted
        f.progress.handle_quiz_completion(&f.user, "a").await;
        assert_eq!(f.quest("champion").await.progress_for(&f.user), 3);
        assert_eq!(f.quest("points-hunter").await.progress_for(&f.user), 30);
    }

    #[tokio::test]
    async fn test_catch_up_completion_rewards_once() {
        let f = fixture().await;
        for i in 1..=5 {
            let id = format!("quiz-{i}");
            f.answered_quiz(&id, None).await;
            f.progress.handle_quiz_completion(&f.user, &id).await;
        }
        f.publish("quick", 75, QuestRequirement::QuizCompletion(5))
            .await;

        let report = f.progress.initialize_quest_progress(&f.user).await;
        assert_eq!(report.completed().collect::<Vec<_>>(), vec!["quick"]);

        let again = f.progress.initialize_quest_progress(&f.user).await;
        assert!(again.quest("quick").is_none());
        assert_eq!(f.reward_count("quick").await, 1);
        assert_eq!(f.balance().await, 50 + 50 + 75);
    }

    #[tokio::test]
    async fn test_catch_up_repairs_missing_reward() {
        let f = fixture().await;
        f.publish("first-event", 150, QuestRequirement::EventParticipation(1))
            .await;
        f.event_with("bbq", vec![f.user.clone()]).await;

        f.store.fail_writes(collections::USERS, Some(f.user.as_str()));
        let report = f.progress.handle_event_participation(&f.user, "bbq").await;
        let update = report
            .quest("first-event")
            .and_then(|q| q.result.as_ref().ok())
            .unwrap();
        assert!(matches!(update.change, ProgressChange::Completed { .. }));
        assert!(matches!(update.reward, Some(Err(_))));
        f.store.heal();
        assert_eq!(f.balance().await, 50);

        let repaired = f.progress.initialize_quest_progress(&f.user).await;
        let update = repaired
            .quest("first-event")
            .and_then(|q| q.result.as_ref().ok())
            .unwrap();
        assert!(matches!(update.reward, Some(Ok(Credit::Posted(_)))));
        assert_eq!(f.balance().await, 200);
    }

    #[tokio::test]
    async fn test_ended_quests_are_ignored() {
        let f = fixture().await;
        let now = Utc::now();
        let ended = Quest::new(
            "old",
            "Old",
            10,
            QuestRequirement::PointsEarned(5),
            now - Duration::days(10),
            now - Duration::days(1),
        );
        f.store
            .create(collections::QUESTS, "old", encode(&ended).unwrap())
            .await
            .unwrap();

        let report = f.progress.handle_points_earned(&f.user, 50, None).await;
        assert!(report.quests.is_empty());
        assert_eq!(f.quest("old").await.progress_for(&f.user), 0);
    }
}
