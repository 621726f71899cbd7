//! SQLite-backed document store
//!
//! All documents live in one table keyed by `(collection, id)`; the body is
//! stored as a JSON object. The connection sits behind a mutex and every
//! operation runs on the blocking pool. Writes take the database write lock
//! up front, so a conditional update is atomic across processes too.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    Document, DocumentChange, DocumentStore, Fields, WriteMode, apply_write,
    change_stream,
};
use crate::error::StoreError;

const CHANGE_BUFFER: usize = 256;

/// Layout version stamped into `schema_version`
const SCHEMA_VERSION: i64 = 1;

/// How long a write waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    version INTEGER NOT NULL,
    fields TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);
"#;

/// [`DocumentStore`] persisted in a SQLite file
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl SqliteStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store dir: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store db: {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to create store schema")?;
        check_schema_version(&conn)?;

        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        })
    }

    /// Run `op` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }

    async fn write(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<Document, StoreError> {
        let collection_owned = collection.to_string();
        let id_owned = id.to_string();

        let (doc, kind) = self
            .with_conn(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let existing = load(&tx, &collection_owned, &id_owned)?;
                let (doc, kind) =
                    apply_write(existing.as_ref(), &collection_owned, &id_owned, fields, mode)?;
                let body = serde_json::to_string(&doc.fields)?;
                tx.execute(
                    r#"INSERT INTO documents (collection, id, version, fields, updated_at, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                       ON CONFLICT(collection, id) DO UPDATE SET
                           version = ?3, fields = ?4, updated_at = ?5"#,
                    params![
                        collection_owned,
                        id_owned,
                        doc.version as i64,
                        body,
                        Utc::now().timestamp_millis()
                    ],
                )?;
                tx.commit()?;
                Ok((doc, kind))
            })
            .await?;

        debug!(collection, id, version = doc.version, "Document written");
        let _ = self.changes.send(DocumentChange {
            collection: collection.to_string(),
            kind,
            document: doc.clone(),
        });
        Ok(doc)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("store connection lock poisoned".into()))
}

fn load(conn: &Connection, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
    let row = conn
        .query_row(
            "SELECT version, fields FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
        )
        .optional()?;

    row.map(|(version, body)| {
        Ok(Document {
            id: id.to_string(),
            version: version as u64,
            fields: serde_json::from_str(&body)?,
        })
    })
    .transpose()
}

/// Stamp a fresh database, refuse one written by a newer layout
fn check_schema_version(conn: &Connection) -> anyhow::Result<()> {
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;
    if version > SCHEMA_VERSION {
        anyhow::bail!(
            "Store schema version {version} is newer than supported version {SCHEMA_VERSION}"
        );
    }
    if version < SCHEMA_VERSION {
        conn.execute(
            "INSERT OR REPLACE INTO schema_version VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let (c, i) = (collection.to_string(), id.to_string());
        self.with_conn(move |conn| load(conn, &c, &i)?.ok_or_else(|| StoreError::not_found(&c, &i)))
            .await
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
        let c = collection.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, version, fields FROM documents WHERE collection = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![c], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?;

            let mut docs = Vec::new();
            for row in rows {
                let (id, version, body) = row?;
                docs.push(Document {
                    id,
                    version: version as u64,
                    fields: serde_json::from_str(&body)?,
                });
            }
            Ok(docs)
        })
        .await
    }

    fn listen(&self, collection: &str, id: Option<&str>) -> BoxStream<'static, DocumentChange> {
        change_stream(self.changes.subscribe(), collection, id)
    }
}
