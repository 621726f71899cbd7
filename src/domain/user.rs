use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a user, supplied by the caller for every operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Why a ledger entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// One-time welcome grant
    Initial,
    Achievement,
    Engagement,
    /// Points spent on something, e.g. joining an event
    Purchase,
    /// Quiz answers and quest completions
    Reward,
    #[serde(other)]
    Other,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Achievement => "achievement",
            Self::Engagement => "engagement",
            Self::Purchase => "purchase",
            Self::Reward => "reward",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable ledger entry. Positive amounts are credits, negative are debits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub user_id: UserId,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    /// Idempotency key such as `quiz:<id>` or `quest:<id>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Transaction {
    pub fn new(
        user_id: &UserId,
        amount: i64,
        kind: TransactionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.clone(),
            amount,
            kind,
            description: description.into(),
            timestamp: Utc::now(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }
}

/// The `users/{id}` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub points: i64,
    /// Append-only, insertion order is chronological
    #[serde(default)]
    pub points_history: Vec<Transaction>,
    #[serde(default)]
    pub achievement_ids: Vec<String>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            points: 0,
            points_history: Vec::new(),
            achievement_ids: Vec::new(),
        }
    }

    /// Sum of every recorded amount. Equals `points` for a consistent ledger.
    pub fn history_total(&self) -> i64 {
        self.points_history.iter().map(|t| t.amount).sum()
    }

    pub fn has_reference(&self, reference: &str) -> bool {
        self.points_history
            .iter()
            .any(|t| t.reference.as_deref() == Some(reference))
    }

    pub fn has_achievement(&self, collectible_id: &str) -> bool {
        self.achievement_ids.iter().any(|id| id == collectible_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_wire_format() {
        let user = UserId::new("u1");
        let tx = Transaction::new(&user, 30, TransactionType::Reward, "Correct quiz answer");
        let value = serde_json::to_value(&tx).unwrap();

        assert_eq!(value["userId"], json!("u1"));
        assert_eq!(value["type"], json!("reward"));
        assert!(value.get("reference").is_none());
    }

    #[test]
    fn test_unknown_transaction_type_reads_as_other() {
        let value = json!({
            "userId": "u1",
            "amount": 5,
            "type": "bonus-from-the-future",
            "description": "",
            "timestamp": "2025-01-01T00:00:00Z"
        });
        let tx: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(tx.kind, TransactionType::Other);
    }

    #[test]
    fn test_user_defaults_missing_fields() {
        let user: User = serde_json::from_value(json!({ "id": "u9" })).unwrap();
        assert_eq!(user.points, 0);
        assert!(user.points_history.is_empty());
        assert_eq!(user.history_total(), 0);
    }
}
