//! Process-local document store

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::{RwLock, broadcast};

use super::{
    ChangeKind, Document, DocumentChange, DocumentStore, Fields, WriteMode, apply_write,
    change_stream,
};
use crate::error::StoreError;

const CHANGE_BUFFER: usize = 256;

/// In-memory [`DocumentStore`]
///
/// Writes to a `(collection, id)` pair, or a whole collection, can be made to
/// fail with [`StoreError::Unavailable`] to exercise partial-failure paths.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    failing: Mutex<HashSet<(String, Option<String>)>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            collections: RwLock::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            changes,
        }
    }

    /// Make writes fail for one document, or for the whole collection when `id` is `None`
    pub fn fail_writes(&self, collection: &str, id: Option<&str>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert((collection.to_string(), id.map(str::to_string)));
        }
    }

    /// Clear every injected failure
    pub fn heal(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    fn check_writable(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let Ok(failing) = self.failing.lock() else {
            return Err(StoreError::Unavailable("failure registry poisoned".into()));
        };
        let whole = (collection.to_string(), None);
        let single = (collection.to_string(), Some(id.to_string()));
        if failing.contains(&whole) || failing.contains(&single) {
            return Err(StoreError::Unavailable(format!(
                "writes to {collection}/{id} are failing"
            )));
        }
        Ok(())
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<Document, StoreError> {
        self.check_writable(collection, id)?;

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let (doc, kind) = apply_write(docs.get(id), collection, id, fields, mode)?;
        docs.insert(id.to_string(), doc.clone());
        drop(collections);

        self.notify(collection, kind, &doc);
        Ok(doc)
    }

    fn notify(&self, collection: &str, kind: ChangeKind, doc: &Document) {
        // No receivers is fine
        let _ = self.changes.send(DocumentChange {
            collection: collection.to_string(),
            kind,
            document: doc.clone(),
        });
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn create(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        self.write(collection, id, fields, WriteMode::Create).await
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, StoreError> {
        self.write(collection, id, fields, WriteMode::Set).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        self.write(collection, id, fields, WriteMode::Merge { expected: None })
            .await
    }

    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        expected_version: u64,
        fields: Fields,
    ) -> Result<Document, StoreError> {
        self.write(
            collection,
            id,
            fields,
            WriteMode::Merge {
                expected: Some(expected_version),
            },
        )
        .await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    fn listen(&self, collection: &str, id: Option<&str>) -> BoxStream<'static, DocumentChange> {
        change_stream(self.changes.subscribe(), collection, id)
    }
}
