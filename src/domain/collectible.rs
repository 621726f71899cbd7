use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// One user's unlock of a collectible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unlock {
    pub user_id: UserId,
    pub unlocked_date: DateTime<Utc>,
}

/// The `achievements/{id}` document. `id` is the collectible's natural key
/// (a country code). At most one entry per user in `unlocked_by`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collectible {
    pub id: String,
    #[serde(default)]
    pub unlocked_by: Vec<Unlock>,
}

impl Collectible {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            unlocked_by: Vec::new(),
        }
    }

    pub fn is_unlocked_by(&self, user: &UserId) -> bool {
        self.unlocked_by.iter().any(|u| &u.user_id == user)
    }

    pub fn unlock_date(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.unlocked_by
            .iter()
            .find(|u| &u.user_id == user)
            .map(|u| u.unlocked_date)
    }

    /// Append an unlock unless the user already has one. Returns true if appended.
    pub fn record_unlock(&mut self, user: &UserId, at: DateTime<Utc>) -> bool {
        if self.is_unlocked_by(user) {
            return false;
        }
        self.unlocked_by.push(Unlock {
            user_id: user.clone(),
            unlocked_date: at,
        });
        true
    }
}
