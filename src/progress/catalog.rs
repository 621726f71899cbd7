//! Default quest set published on first run

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::domain::{Quest, QuestRequirement};
use crate::error::StoreError;
use crate::store::{DocumentStore, collections, encode};

/// Static definition of a published quest
pub struct QuestTemplate {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub points: i64,
    pub requirement: QuestRequirement,
    pub duration_days: i64,
}

impl QuestTemplate {
    pub fn build(&self, now: DateTime<Utc>) -> Quest {
        Quest::new(
            self.id,
            self.title,
            self.points,
            self.requirement,
            now,
            now + Duration::days(self.duration_days),
        )
        .with_description(self.description)
    }
}

pub static DEFAULT_QUESTS: &[QuestTemplate] = &[
    QuestTemplate {
        id: "weekly-quiz-champion",
        title: "Weekly Quiz Champion",
        description: "Complete 10 quizzes this week",
        points: 100,
        requirement: QuestRequirement::QuizCompletion(10),
        duration_days: 7,
    },
    QuestTemplate {
        id: "event-explorer",
        title: "Event Explorer",
        description: "Participate in 5 different events",
        points: 150,
        requirement: QuestRequirement::EventParticipation(5),
        duration_days: 14,
    },
    QuestTemplate {
        id: "flag-collector",
        title: "Flag Collector",
        description: "Collect 8 country achievements",
        points: 200,
        requirement: QuestRequirement::AchievementCollection(8),
        duration_days: 30,
    },
    QuestTemplate {
        id: "points-hunter",
        title: "Points Hunter",
        description: "Earn 1000 points",
        points: 300,
        requirement: QuestRequirement::PointsEarned(1000),
        duration_days: 30,
    },
    QuestTemplate {
        id: "quick-learner",
        title: "Quick Learner",
        description: "Complete 5 quizzes in 3 days",
        points: 75,
        requirement: QuestRequirement::QuizCompletion(5),
        duration_days: 3,
    },
];

/// Create every default quest that does not exist yet, windowed from `now`.
/// Returns the ids created.
pub async fn publish_default_quests(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
) -> Result<Vec<String>, StoreError> {
    let mut created = Vec::new();
    for template in DEFAULT_QUESTS {
        let fields = encode(&template.build(now))?;
        match store.create(collections::QUESTS, template.id, fields).await {
            Ok(_) => created.push(template.id.to_string()),
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(quest = template.id, "Quest already published");
            }
            Err(e) => return Err(e),
        }
    }
    info!(count = created.len(), "Published default quests");
    Ok(created)
}
