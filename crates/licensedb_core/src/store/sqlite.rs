//! Schema-validated backend over SQLite.
//!
//! # Responsibility
//! - Persist documents as JSON bodies keyed by `(collection, id)`.
//! - Validate every written document against the schema registry.
//! - Run each transaction as one `IMMEDIATE` SQLite transaction.
//!
//! # Invariants
//! - Collection order is the `position` column, assigned on first insert.
//! - Only journaled ids are written; untouched rows are never rewritten.
//! - A validation failure rolls back the whole transaction.

use crate::config::BackendKind;
use crate::db::{open_db, open_db_in_memory};
use crate::model::document::{Document, FIELD_CREATED_AT, FIELD_UPDATED_AT};
use crate::model::id::RecordId;
use crate::store::error::{StoreError, StoreResult};
use crate::store::schema::SchemaRegistry;
use crate::store::set::{Change, DocumentSet};
use crate::store::{lock_order, validate_collection_name, Backend, Workspace};
use log::debug;
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Document store backed by one SQLite database.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    schemas: SchemaRegistry,
    location: String,
}

impl SqliteBackend {
    /// Opens (creating and migrating if needed) a database file.
    pub fn open(path: impl AsRef<Path>, schemas: SchemaRegistry) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::WriteFailure {
                location: parent.display().to_string(),
                message: err.to_string(),
            })?;
        }
        Ok(Self {
            conn: Mutex::new(open_db(path)?),
            schemas,
            location: path.display().to_string(),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(schemas: SchemaRegistry) -> StoreResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_db_in_memory()?),
            schemas,
            location: ":memory:".to_string(),
        })
    }

    /// Current revision counter of `collection` (0 when never written).
    pub fn revision(&self, collection: &str) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        read_revision(&conn, collection)
    }

    fn load_set(&self, conn: &Connection, collection: &str) -> StoreResult<DocumentSet> {
        let mut stmt = conn.prepare(
            "SELECT id, body
             FROM documents
             WHERE collection = ?1
             ORDER BY position ASC, id ASC;",
        )?;
        let mut rows = stmt.query([collection])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get("id")?;
            let body: String = row.get("body")?;
            let doc: Document =
                serde_json::from_str(&body).map_err(|err| self.corruption(collection, &id, err))?;
            documents.push(doc);
        }
        DocumentSet::load(collection, documents).map_err(|message| StoreError::Corruption {
            location: format!("{}#{collection}", self.location),
            message,
        })
    }

    fn persist(&self, conn: &Connection, set: &DocumentSet) -> StoreResult<()> {
        let touched: BTreeSet<&RecordId> = set
            .changes()
            .iter()
            .map(|change| match change {
                Change::Upsert(id) | Change::Remove(id) => id,
            })
            .collect();

        // Upserts go in collection order so new rows get increasing positions.
        let mut written = BTreeSet::new();
        for doc in set.iter() {
            let Some(id) = doc.id() else { continue };
            if !touched.contains(&id) {
                continue;
            }
            self.schemas.validate(set.name(), doc)?;
            let body = serde_json::to_string(doc).map_err(|err| StoreError::WriteFailure {
                location: format!("{}#{}", self.location, set.name()),
                message: err.to_string(),
            })?;
            conn.execute(
                "INSERT INTO documents (collection, id, position, body, created_at, updated_at)
                 VALUES (
                    ?1,
                    ?2,
                    (SELECT COALESCE(MAX(position), 0) + 1 FROM documents WHERE collection = ?1),
                    ?3,
                    ?4,
                    ?5
                 )
                 ON CONFLICT (collection, id) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at;",
                params![
                    set.name(),
                    id.as_str(),
                    body,
                    doc.get(FIELD_CREATED_AT).and_then(|v| v.as_str()).unwrap_or(""),
                    doc.get(FIELD_UPDATED_AT).and_then(|v| v.as_str()).unwrap_or(""),
                ],
            )?;
            written.insert(id);
        }

        for id in touched {
            if written.contains(id) || set.contains(id) {
                continue;
            }
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
                params![set.name(), id.as_str()],
            )?;
        }

        conn.execute(
            "INSERT INTO collection_revisions (collection, revision) VALUES (?1, 1)
             ON CONFLICT (collection) DO UPDATE SET revision = revision + 1;",
            [set.name()],
        )?;
        Ok(())
    }

    fn corruption(&self, collection: &str, id: &str, err: serde_json::Error) -> StoreError {
        StoreError::Corruption {
            location: format!("{}#{collection}/{id}", self.location),
            message: err.to_string(),
        }
    }
}

fn read_revision(conn: &Connection, collection: &str) -> StoreResult<u64> {
    let revision = conn
        .query_row(
            "SELECT revision FROM collection_revisions WHERE collection = ?1;",
            [collection],
            |row| row.get::<_, i64>(0),
        )
        .map(|value| value.max(0) as u64);
    match revision {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(err) => Err(err.into()),
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn read<T, F>(&self, collection: &str, read: F) -> StoreResult<T>
    where
        F: FnOnce(&DocumentSet) -> StoreResult<T>,
    {
        validate_collection_name(collection)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let set = self.load_set(&conn, collection)?;
        drop(conn);
        read(&set)
    }

    fn transact<T, F>(&self, collections: &[&str], body: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Workspace) -> StoreResult<T>,
    {
        let started_at = Instant::now();
        let names = lock_order(collections)?;
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut sets = Vec::with_capacity(names.len());
        for name in &names {
            sets.push(self.load_set(&tx, name)?);
        }

        let mut workspace = Workspace::new(sets);
        // Dropping `tx` on an early return rolls everything back.
        let value = body(&mut workspace)?;
        for set in workspace.into_sets().iter().filter(|set| set.is_dirty()) {
            self.persist(&tx, set)?;
        }
        tx.commit()?;

        debug!(
            "event=store_transact module=store status=ok backend=sqlite collections={} duration_ms={}",
            names.join(","),
            started_at.elapsed().as_millis()
        );
        Ok(value)
    }
}
