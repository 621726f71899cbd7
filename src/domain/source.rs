use std::fmt;

/// A real-world unit of progress, used as an idempotency key.
///
/// Rendered as `<kind>:<id>`: it tags ledger transactions (`Transaction::reference`)
/// and the per-user source lists kept on quests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Quiz(String),
    Event(String),
    Achievement(String),
    /// Completion reward of a quest
    Quest(String),
    /// Return of a ticket price, keyed `<event id>:<ticket id>`
    Refund(String),
}

impl Source {
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn parse(key: &str) -> Option<Self> {
        let (kind, id) = key.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        let id = id.to_string();
        match kind {
            "quiz" => Some(Self::Quiz(id)),
            "event" => Some(Self::Event(id)),
            "achievement" => Some(Self::Achievement(id)),
            "quest" => Some(Self::Quest(id)),
            "refund" => Some(Self::Refund(id)),
            _ => None,
        }
    }

    /// Whether a reference string marks a quest completion reward
    pub fn is_quest_reward(reference: &str) -> bool {
        matches!(Self::parse(reference), Some(Self::Quest(_)))
    }

    /// Whether a reference string marks a ticket refund
    pub fn is_refund(reference: &str) -> bool {
        matches!(Self::parse(reference), Some(Self::Refund(_)))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiz(id) => write!(f, "quiz:{id}"),
            Self::Event(id) => write!(f, "event:{id}"),
            Self::Achievement(id) => write!(f, "achievement:{id}"),
            Self::Quest(id) => write!(f, "quest:{id}"),
            Self::Refund(id) => write!(f, "refund:{id}"),
        }
    }
}
