//! Error taxonomy for the store, the ledger and the engines built on them

/// Errors surfaced by a [`DocumentStore`](crate::store::DocumentStore)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    #[error("Version conflict on {collection}/{id}: expected {expected}, found {actual}")]
    Conflict {
        collection: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid document data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors surfaced by the [`Ledger`](crate::ledger::Ledger)
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Spend exceeds the balance. Nothing was written.
    #[error("Insufficient points balance: have {balance}, need {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    #[error("Points amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Gave up writing ledger for {user_id} after {attempts} conflicting attempts")]
    Contention { user_id: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::InsufficientFunds { .. })
    }
}

/// Failure to update one quest. Collected into reports, never propagated by handlers.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Gave up updating quest {quest_id} after {attempts} conflicting attempts")]
    Contention { quest_id: String, attempts: u32 },
}

/// Errors surfaced to the interface layer by quiz and event actions
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Invalid quiz: {0}")]
    InvalidQuiz(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ActivityError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, Self::Ledger(e) if e.is_insufficient_funds())
    }
}
