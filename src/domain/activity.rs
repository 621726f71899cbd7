use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// The `quizzes/{id}` document. `participants` lists users who answered correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    /// Author
    pub user_id: UserId,
    pub question: String,
    pub answers: Vec<String>,
    pub correct_answer_index: usize,
    #[serde(default = "default_quiz_points")]
    pub points: i64,
    #[serde(default)]
    pub participants: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    /// Collectible granted for a correct answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievement_id: Option<String>,
}

fn default_quiz_points() -> i64 {
    10
}

impl Quiz {
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }
}

/// The `events/{id}` document. Joining costs `price` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    /// Organizer
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub participants: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }
}
