//! Quizzes and events: the game actions that feed the engines
//!
//! Answering a quiz correctly and joining or leaving an event change the
//! quiz/event document first, then hand over to [`QuestProgress`]. Only
//! validation errors and `InsufficientFunds` reach the caller; quest
//! bookkeeping comes back as a [`ProgressReport`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{Event, Quiz, Source, TransactionType, UserId};
use crate::error::{ActivityError, StoreError};
use crate::ledger::{Ledger, Posting};
use crate::locks::KeyedLocks;
use crate::progress::{ProgressReport, QuestProgress};
use crate::store::{DocumentStore, Fields, collections, encode, fetch};

const DEFAULT_QUIZ_POINTS: i64 = 10;

/// Input for [`Activities::create_quiz`]
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub question: String,
    pub answers: Vec<String>,
    pub correct_answer_index: usize,
    /// Defaults to 10
    pub points: Option<i64>,
    pub achievement_id: Option<String>,
}

/// Input for [`Activities::create_event`]
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub location: String,
    pub date: DateTime<Utc>,
    pub price: i64,
}

#[derive(Debug)]
pub enum Answer {
    Correct(ProgressReport),
    Incorrect,
}

impl Answer {
    pub fn is_correct(&self) -> bool {
        matches!(self, Self::Correct(_))
    }
}

#[derive(Debug)]
pub enum Join {
    Joined {
        /// The ticket debit, `None` for free events
        ticket: Option<Posting>,
        report: ProgressReport,
    },
    AlreadyJoined,
}

#[derive(Debug)]
pub enum Leave {
    Left(ProgressReport),
    NotJoined,
}

pub struct Activities {
    store: Arc<dyn DocumentStore>,
    ledger: Arc<Ledger>,
    progress: Arc<QuestProgress>,
    locks: KeyedLocks,
    max_retries: u32,
}

impl Activities {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ledger: Arc<Ledger>,
        progress: Arc<QuestProgress>,
    ) -> Self {
        Self::from_config(store, ledger, progress, &Config::default())
    }

    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        ledger: Arc<Ledger>,
        progress: Arc<QuestProgress>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            ledger,
            progress,
            locks: KeyedLocks::new(),
            max_retries: config.engine.max_write_retries.max(1),
        }
    }

    pub async fn create_quiz(&self, author: &UserId, new: NewQuiz) -> Result<Quiz, ActivityError> {
        if new.question.trim().is_empty() {
            return Err(ActivityError::InvalidQuiz("question is empty".into()));
        }
        if new.answers.len() < 2 {
            return Err(ActivityError::InvalidQuiz(
                "at least two answers are required".into(),
            ));
        }
        if new.correct_answer_index >= new.answers.len() {
            return Err(ActivityError::InvalidQuiz(format!(
                "correct answer {} out of range (0..{})",
                new.correct_answer_index,
                new.answers.len()
            )));
        }
        let points = new.points.unwrap_or(DEFAULT_QUIZ_POINTS);
        if points < 0 {
            return Err(ActivityError::InvalidQuiz(format!("negative points: {points}")));
        }

        let quiz = Quiz {
            id: Uuid::new_v4().to_string(),
            user_id: author.clone(),
            question: new.question,
            answers: new.answers,
            correct_answer_index: new.correct_answer_index,
            points,
            participants: Vec::new(),
            created_at: Utc::now(),
            achievement_id: new.achievement_id,
        };
        self.store
            .create(collections::QUIZZES, &quiz.id, encode(&quiz)?)
            .await?;
        info!(quiz = %quiz.id, author = %author, "Created quiz");
        Ok(quiz)
    }

    /// Check an answer. A correct one records the user on the quiz and runs quiz completion.
    pub async fn submit_answer(
        &self,
        user: &UserId,
        quiz_id: &str,
        answer_index: usize,
    ) -> Result<Answer, ActivityError> {
        let (quiz, _) = fetch::<Quiz>(&*self.store, collections::QUIZZES, quiz_id).await?;
        if answer_index >= quiz.answers.len() {
            return Err(ActivityError::InvalidQuiz(format!(
                "answer {answer_index} out of range (0..{})",
                quiz.answers.len()
            )));
        }
        if answer_index != quiz.correct_answer_index {
            debug!(user = %user, quiz = quiz_id, "Incorrect answer");
            return Ok(Answer::Incorrect);
        }

        self.edit_participants(collections::QUIZZES, quiz_id, user, true)
            .await?;
        let report = self.progress.handle_quiz_completion(user, quiz_id).await;
        Ok(Answer::Correct(report))
    }

    pub async fn create_event(
        &self,
        organizer: &UserId,
        new: NewEvent,
    ) -> Result<Event, ActivityError> {
        if new.title.trim().is_empty() {
            return Err(ActivityError::InvalidEvent("title is empty".into()));
        }
        if new.price < 0 {
            return Err(ActivityError::InvalidEvent(format!(
                "negative price: {}",
                new.price
            )));
        }

        let event = Event {
            id: Uuid::new_v4().to_string(),
            user_id: organizer.clone(),
            title: new.title,
            description: new.description,
            location: new.location,
            date: new.date,
            price: new.price,
            participants: Vec::new(),
            created_at: Utc::now(),
        };
        self.store
            .create(collections::EVENTS, &event.id, encode(&event)?)
            .await?;
        info!(event = %event.id, organizer = %organizer, price = event.price, "Created event");
        Ok(event)
    }

    /// Pay the ticket, take a seat, count the participation
    ///
    /// `InsufficientFunds` leaves both the balance and the event untouched. If
    /// the seat cannot be written after paying, the ticket is refunded.
    pub async fn join_event(&self, user: &UserId, event_id: &str) -> Result<Join, ActivityError> {
        let (event, _) = fetch::<Event>(&*self.store, collections::EVENTS, event_id).await?;
        if event.has_participant(user) {
            debug!(user = %user, event = event_id, "Already joined");
            return Ok(Join::AlreadyJoined);
        }

        let ticket_id = Uuid::new_v4().to_string();
        let ticket = if event.price > 0 {
            Some(
                self.ledger
                    .spend_points(
                        user,
                        event.price,
                        TransactionType::Purchase,
                        &format!("Joined event: {}", event.title),
                    )
                    .await?,
            )
        } else {
            None
        };

        match self
            .edit_participants(collections::EVENTS, event_id, user, true)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // Joined concurrently by another call that also paid
                if let Some(ticket) = &ticket {
                    self.refund(user, &event, &ticket_id, ticket).await;
                }
                return Ok(Join::AlreadyJoined);
            }
            Err(e) => {
                if let Some(ticket) = &ticket {
                    self.refund(user, &event, &ticket_id, ticket).await;
                }
                return Err(e.into());
            }
        }

        info!(user = %user, event = event_id, "Joined event");
        let report = self.progress.handle_event_participation(user, event_id).await;
        Ok(Join::Joined { ticket, report })
    }

    /// Give up a seat. The ticket is not refunded.
    pub async fn leave_event(&self, user: &UserId, event_id: &str) -> Result<Leave, ActivityError> {
        if !self
            .edit_participants(collections::EVENTS, event_id, user, false)
            .await?
        {
            debug!(user = %user, event = event_id, "Not a participant");
            return Ok(Leave::NotJoined);
        }
        info!(user = %user, event = event_id, "Left event");
        let report = self
            .progress
            .handle_event_participation_removal(user, event_id)
            .await;
        Ok(Leave::Left(report))
    }

    /// Return a ticket price. Keyed per ticket so it is credited at most once
    /// and never counts as earned points.
    async fn refund(&self, user: &UserId, event: &Event, ticket_id: &str, ticket: &Posting) {
        let reference = Source::Refund(format!("{}:{ticket_id}", event.id));
        if let Err(e) = self
            .ledger
            .add_points_once(
                user,
                -ticket.transaction.amount,
                TransactionType::Other,
                &format!("Refund: {}", event.title),
                &reference,
            )
            .await
        {
            warn!(user = %user, event = %event.id, error = %e, "Ticket refund failed");
        }
    }

    /// Add (`join`) or remove `user` in a document's `participants`.
    /// Returns false when the list already had the requested shape.
    async fn edit_participants(
        &self,
        collection: &str,
        id: &str,
        user: &UserId,
        join: bool,
    ) -> Result<bool, StoreError> {
        let key = format!("{collection}/{id}");
        let _guard = self.locks.lock(&key).await;

        let mut last_conflict = None;
        for _ in 0..self.max_retries {
            let doc = self.store.get(collection, id).await?;
            let mut participants: Vec<UserId> = match doc.fields.get("participants") {
                Some(value) => serde_json::from_value(value.clone())?,
                None => Vec::new(),
            };

            let present = participants.contains(user);
            if present == join {
                return Ok(false);
            }
            if join {
                participants.push(user.clone());
            } else {
                participants.retain(|p| p != user);
            }

            let mut fields = Fields::new();
            fields.insert(
                "participants".to_string(),
                serde_json::to_value(&participants)?,
            );
            match self
                .store
                .update_if(collection, id, doc.version, fields)
                .await
            {
                Ok(_) => return Ok(true),
                Err(e) if e.is_conflict() => last_conflict = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_conflict.unwrap_or_else(|| StoreError::Unavailable(format!("{key} kept changing"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::Achievements;
    use crate::domain::{Quest, QuestRequirement};
    use crate::store::InMemoryStore;
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        ledger: Arc<Ledger>,
        activities: Activities,
        user: UserId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let shared: Arc<dyn DocumentStore> = store.clone();
        let ledger = Arc::new(Ledger::new(Arc::clone(&shared)));
        let achievements = Arc::new(Achievements::new(Arc::clone(&shared)));
        let progress = Arc::new(QuestProgress::new(
            Arc::clone(&shared),
            Arc::clone(&ledger),
            achievements,
        ));
        let activities = Activities::new(shared, Arc::clone(&ledger), progress);
        let user = UserId::new("u1");
        ledger.setup_initial_points(&user).await.unwrap();
        Fixture {
            store,
            ledger,
            activities,
            user,
        }
    }

    fn capitals() -> NewQuiz {
        NewQuiz {
            question: "Capital of Albania?".into(),
            answers: vec!["Tirana".into(), "Durres".into()],
            correct_answer_index: 0,
            points: None,
            achievement_id: None,
        }
    }

    fn concert(price: i64) -> NewEvent {
        NewEvent {
            title: "Concert".into(),
            description: String::new(),
            location: "Park".into(),
            date: Utc::now() + Duration::days(2),
            price,
        }
    }

    #[tokio::test]
    async fn test_quiz_validation() {
        let f = fixture().await;
        let mut quiz = capitals();
        quiz.correct_answer_index = 2;
        assert!(matches!(
            f.activities.create_quiz(&f.user, quiz).await,
            Err(ActivityError::InvalidQuiz(_))
        ));

        let mut quiz = capitals();
        quiz.answers.truncate(1);
        assert!(matches!(
            f.activities.create_quiz(&f.user, quiz).await,
            Err(ActivityError::InvalidQuiz(_))
        ));
    }

    #[tokio::test]
    async fn test_correct_answer_credits_once() {
        let f = fixture().await;
        let quiz = f.activities.create_quiz(&f.user, capitals()).await.unwrap();
        assert_eq!(quiz.points, 10);

        let wrong = f.activities.submit_answer(&f.user, &quiz.id, 1).await.unwrap();
        assert!(!wrong.is_correct());
        assert_eq!(f.ledger.get_balance(&f.user).await.unwrap(), 50);

        let right = f.activities.submit_answer(&f.user, &quiz.id, 0).await.unwrap();
        assert!(right.is_correct());
        f.activities.submit_answer(&f.user, &quiz.id, 0).await.unwrap();
        assert_eq!(f.ledger.get_balance(&f.user).await.unwrap(), 60);

        let (stored, _) = fetch::<Quiz>(&*f.store, collections::QUIZZES, &quiz.id)
            .await
            .unwrap();
        assert_eq!(stored.participants, vec![f.user.clone()]);

        assert!(matches!(
            f.activities.submit_answer(&f.user, &quiz.id, 5).await,
            Err(ActivityError::InvalidQuiz(_))
        ));
    }

    #[tokio::test]
    async fn test_join_without_funds_leaves_event_untouched() {
        let f = fixture().await;
        let event = f.activities.create_event(&f.user, concert(80)).await.unwrap();

        let err = f.activities.join_event(&f.user, &event.id).await.unwrap_err();
        assert!(err.is_insufficient_funds());

        let (stored, _) = fetch::<Event>(&*f.store, collections::EVENTS, &event.id)
            .await
            .unwrap();
        assert!(stored.participants.is_empty());
        assert_eq!(f.ledger.get_balance(&f.user).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_join_and_leave_event() {
        let f = fixture().await;
        let now = Utc::now();
        let quest = Quest::new(
            "explorer",
            "Event Explorer",
            150,
            QuestRequirement::EventParticipation(5),
            now - Duration::days(1),
            now + Duration::days(1),
        );
        f.store
            .create(collections::QUESTS, "explorer", encode(&quest).unwrap())
            .await
            .unwrap();
        let event = f.activities.create_event(&f.user, concert(20)).await.unwrap();

        let joined = f.activities.join_event(&f.user, &event.id).await.unwrap();
        match joined {
            Join::Joined { ticket, report } => {
                assert_eq!(ticket.map(|t| t.balance), Some(30));
                assert!(report.is_clean());
            }
            Join::AlreadyJoined => panic!("expected a fresh join"),
        }
        assert!(matches!(
            f.activities.join_event(&f.user, &event.id).await.unwrap(),
            Join::AlreadyJoined
        ));

        let (stored, _) = fetch::<Quest>(&*f.store, collections::QUESTS, "explorer")
            .await
            .unwrap();
        assert_eq!(stored.progress_for(&f.user), 1);

        assert!(matches!(
            f.activities.leave_event(&f.user, &event.id).await.unwrap(),
            Leave::Left(_)
        ));
        assert!(matches!(
            f.activities.leave_event(&f.user, &event.id).await.unwrap(),
            Leave::NotJoined
        ));
        let (stored, _) = fetch::<Quest>(&*f.store, collections::QUESTS, "explorer")
            .await
            .unwrap();
        assert_eq!(stored.progress_for(&f.user), 0);
        assert_eq!(f.ledger.get_balance(&f.user).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_failed_seat_write_refunds_ticket() {
        let f = fixture().await;
        let event = f.activities.create_event(&f.user, concert(20)).await.unwrap();
        f.store.fail_writes(collections::EVENTS, Some(&event.id));

        let err = f.activities.join_event(&f.user, &event.id).await.unwrap_err();
        assert!(matches!(err, ActivityError::Store(StoreError::Unavailable(_))));

        let account = f.ledger.account(&f.user).await.unwrap();
        assert_eq!(account.points, 50);
        assert_eq!(account.points, account.history_total());
        assert_eq!(account.points_history.len(), 3);
    }

    #[tokio::test]
    async fn test_refunds_are_not_earned_points() {
        let f = fixture().await;
        let now = Utc::now();
        let hunter = Quest::new(
            "points-hunter",
            "Points Hunter",
            300,
            QuestRequirement::PointsEarned(1000),
            now - Duration::days(1),
            now + Duration::days(1),
        );
        f.store
            .create(collections::QUESTS, "points-hunter", encode(&hunter).unwrap())
            .await
            .unwrap();

        let event = f.activities.create_event(&f.user, concert(40)).await.unwrap();
        f.store.fail_writes(collections::EVENTS, Some(&event.id));
        for _ in 0..2 {
            assert!(f.activities.join_event(&f.user, &event.id).await.is_err());
        }
        f.store.heal();

        // Each failed attempt gets its own refund
        let account = f.ledger.account(&f.user).await.unwrap();
        assert_eq!(account.points, 50);
        let refunds = account
            .points_history
            .iter()
            .filter(|t| t.reference.as_deref().is_some_and(Source::is_refund))
            .count();
        assert_eq!(refunds, 2);

        let (earned, _) = f.ledger.earned_points(&f.user).await.unwrap();
        assert_eq!(earned, 0);
        f.activities.progress.initialize_quest_progress(&f.user).await;
        let (stored, _) = fetch::<Quest>(&*f.store, collections::QUESTS, "points-hunter")
            .await
            .unwrap();
        assert_eq!(stored.progress_for(&f.user), 0);
    }
}
