//! Keyed document store
//!
//! The engines only ever see [`DocumentStore`]: per-document get/create/update,
//! a conditional update on the document version, collection listing and a
//! change feed. Two backends are provided:
//!
//! - [`InMemoryStore`]: process-local, with write-failure injection for tests
//! - [`SqliteStore`]: a single `documents` table in `~/.questline/store.db`
//!
//! Documents are JSON objects. Typed access goes through [`Document::decode`]
//! and [`encode`].

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::StoreError;

/// Collection names used by the engines
pub mod collections {
    pub const USERS: &str = "users";
    pub const QUESTS: &str = "quests";
    pub const ACHIEVEMENTS: &str = "achievements";
    pub const QUIZZES: &str = "quizzes";
    pub const EVENTS: &str = "events";
}

/// Top-level document fields
pub type Fields = Map<String, Value>;

/// A stored document. `version` starts at 1 and grows by one on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub fields: Fields,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// Serialize a value into top-level document fields
pub fn encode<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(StoreError::Serialization(serde::ser::Error::custom(
            "document must serialize to a JSON object",
        ))),
    }
}

/// Keep only `keys` from `fields`, for partial updates
pub fn pick(mut fields: Fields, keys: &[&str]) -> Fields {
    fields.retain(|k, _| keys.contains(&k.as_str()));
    fields
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
}

/// A push notification from [`DocumentStore::listen`]
#[derive(Debug, Clone)]
pub struct DocumentChange {
    pub collection: String,
    pub kind: ChangeKind,
    pub document: Document,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `NotFound` when absent
    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError>;

    /// Create a document, `AlreadyExists` when present
    async fn create(&self, collection: &str, id: &str, fields: Fields)
    -> Result<Document, StoreError>;

    /// Create or fully replace a document
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, StoreError>;

    /// Merge top-level fields into an existing document (last write wins)
    async fn update(&self, collection: &str, id: &str, fields: Fields)
    -> Result<Document, StoreError>;

    /// Merge only if the stored version equals `expected_version`, else `Conflict`
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        fields: Fields,
    ) -> Result<Document, StoreError>;

    /// All documents of a collection, ordered by id
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Changes to `collection` (optionally a single document) made after this call
    fn listen(&self, collection: &str, id: Option<&str>) -> BoxStream<'static, DocumentChange>;
}

/// Fetch and decode a document, returning it with its version
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<(T, u64), StoreError> {
    let doc = store.get(collection, id).await?;
    Ok((doc.decode()?, doc.version))
}

/// Fetch and decode a whole collection
pub async fn fetch_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .list(collection)
        .await?
        .iter()
        .map(Document::decode)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteMode {
    Create,
    Set,
    Merge { expected: Option<u64> },
}

/// Shared write semantics for every backend
pub(crate) fn apply_write(
    existing: Option<&Document>,
    collection: &str,
    id: &str,
    fields: Fields,
    mode: WriteMode,
) -> Result<(Document, ChangeKind), StoreError> {
    match (mode, existing) {
        (WriteMode::Create, Some(_)) => Err(StoreError::AlreadyExists {
            collection: collection.to_string(),
            id: id.to_string(),
        }),
        (WriteMode::Create | WriteMode::Set, None) => Ok((
            Document {
                id: id.to_string(),
                version: 1,
                fields,
            },
            ChangeKind::Created,
        )),
        (WriteMode::Set, Some(doc)) => Ok((
            Document {
                id: id.to_string(),
                version: doc.version + 1,
                fields,
            },
            ChangeKind::Updated,
        )),
        (WriteMode::Merge { .. }, None) => Err(StoreError::not_found(collection, id)),
        (WriteMode::Merge { expected }, Some(doc)) => {
            if let Some(expected) = expected {
                if expected != doc.version {
                    return Err(StoreError::Conflict {
                        collection: collection.to_string(),
                        id: id.to_string(),
                        expected,
                        actual: doc.version,
                    });
                }
            }
            let mut merged = doc.clone();
            merged.fields.extend(fields);
            merged.version += 1;
            Ok((merged, ChangeKind::Updated))
        }
    }
}

/// Turn a broadcast receiver into a filtered change stream
pub(crate) fn change_stream(
    rx: broadcast::Receiver<DocumentChange>,
    collection: &str,
    id: Option<&str>,
) -> BoxStream<'static, DocumentChange> {
    let collection = collection.to_string();
    let id = id.map(str::to_string);

    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => return Some((change, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change listener lagged, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .filter(move |change| {
        let matches = change.collection == collection
            && id.as_ref().is_none_or(|id| &change.document.id == id);
        futures::future::ready(matches)
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let doc = Document {
            id: "u1".into(),
            version: 3,
            fields: fields(json!({ "points": 10, "achievementIds": ["DE"] })),
        };
        let (merged, kind) = apply_write(
            Some(&doc),
            "users",
            "u1",
            fields(json!({ "points": 20 })),
            WriteMode::Merge { expected: Some(3) },
        )
        .unwrap();

        assert_eq!(kind, ChangeKind::Updated);
        assert_eq!(merged.version, 4);
        assert_eq!(merged.fields["points"], json!(20));
        assert_eq!(merged.fields["achievementIds"], json!(["DE"]));
    }

    #[test]
    fn test_stale_version_conflicts() {
        let doc = Document {
            id: "q1".into(),
            version: 5,
            fields: Fields::new(),
        };
        let err = apply_write(
            Some(&doc),
            "quests",
            "q1",
            Fields::new(),
            WriteMode::Merge { expected: Some(4) },
        )
        .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_pick_keeps_listed_keys() {
        let picked = pick(
            fields(json!({ "a": 1, "b": 2, "c": 3 })),
            &["a", "c"],
        );
        assert_eq!(Value::Object(picked), json!({ "a": 1, "c": 3 }));
    }
}
