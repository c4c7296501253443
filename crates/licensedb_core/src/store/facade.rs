//! Backend-agnostic entry points: the `Database` facade and collection handles.
//!
//! # Responsibility
//! - Pick a backend from `StoreConfig`.
//! - Expose the per-collection CRUD surface over any `Backend`.
//!
//! # Invariants
//! - Every write method is one `transact` call.
//! - Writes to `licenses` or `systems` also open the other collection and
//!   replay the write journal through `crate::sync`, so symmetry holds no
//!   matter which surface wrote.
//! - Returned documents are copies of the post-sync state.
//!
//! # See also
//! - `crate::service` for the License/System use-case layer.

use crate::config::{BackendKind, StoreConfig};
use crate::model::document::Document;
use crate::model::id::RecordId;
use crate::model::relation::{LICENSES, SYSTEMS};
use crate::query::Filter;
use crate::store::error::StoreResult;
use crate::store::json::JsonBackend;
use crate::store::schema::SchemaRegistry;
use crate::store::set::DocumentSet;
use crate::store::sqlite::SqliteBackend;
use crate::store::{validate_collection_name, Backend, Workspace};
use crate::sync::{licenses_changed, systems_changed};
use crate::update::Modifiers;
use log::info;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Store handle selected at open time.
#[derive(Debug)]
pub enum Database {
    Json(JsonBackend),
    Sqlite(SqliteBackend),
}

impl Database {
    /// Opens the backend named by `config`.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let db = match config.backend {
            BackendKind::Json => Self::Json(JsonBackend::open(
                &config.data_dir,
                config.lock_timeout(),
            )?),
            BackendKind::Sqlite => Self::Sqlite(SqliteBackend::open(
                config.sqlite_path(),
                SchemaRegistry::defaults(),
            )?),
        };
        info!(
            "event=database_open module=store status=ok backend={} data_dir={}",
            config.backend,
            config.data_dir.display()
        );
        Ok(db)
    }
}

impl Backend for Database {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Json(backend) => backend.kind(),
            Self::Sqlite(backend) => backend.kind(),
        }
    }

    fn read<T, F>(&self, collection: &str, read: F) -> StoreResult<T>
    where
        F: FnOnce(&DocumentSet) -> StoreResult<T>,
    {
        match self {
            Self::Json(backend) => backend.read(collection, read),
            Self::Sqlite(backend) => backend.read(collection, read),
        }
    }

    fn transact<T, F>(&self, collections: &[&str], body: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Workspace) -> StoreResult<T>,
    {
        match self {
            Self::Json(backend) => backend.transact(collections, body),
            Self::Sqlite(backend) => backend.transact(collections, body),
        }
    }
}

/// CRUD handle for one named collection.
#[derive(Debug)]
pub struct Collection<'a, B: Backend> {
    backend: &'a B,
    name: String,
}

impl<'a, B: Backend> Collection<'a, B> {
    pub fn new(backend: &'a B, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Matching documents in collection order.
    pub fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.backend.read(&self.name, |set| Ok(set.find(filter)))
    }

    pub fn find_by_id(&self, id: &RecordId) -> StoreResult<Option<Document>> {
        self.backend
            .read(&self.name, |set| Ok(set.find_by_id(id).cloned()))
    }

    pub fn create(&self, doc: Document) -> StoreResult<Document> {
        self.write(|set| set.create(doc), |set, created| refreshed(set, created))
    }

    /// Shallow-merges `patch`; `None` when no document has `id`.
    pub fn update(&self, id: &RecordId, patch: Map<String, Value>) -> StoreResult<Option<Document>> {
        self.write(
            |set| Ok(set.update(id, &patch)),
            |set, updated| updated.map(|doc| refreshed(set, doc)),
        )
    }

    pub fn delete(&self, id: &RecordId) -> StoreResult<bool> {
        self.write(|set| Ok(set.delete(id)), |_, removed| removed)
    }

    pub fn insert_many(&self, docs: Vec<Document>) -> StoreResult<Vec<Document>> {
        self.write(
            |set| set.insert_many(docs),
            |set, created| created.into_iter().map(|doc| refreshed(set, doc)).collect(),
        )
    }

    pub fn delete_many(&self, filter: &Filter) -> StoreResult<usize> {
        self.write(|set| Ok(set.delete_many(filter)), |_, count| count)
    }

    pub fn update_many(&self, filter: &Filter, modifiers: &Modifiers) -> StoreResult<usize> {
        self.write(|set| set.update_many(filter, modifiers), |_, count| count)
    }

    pub fn distinct(&self, field: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        self.backend
            .read(&self.name, |set| Ok(set.distinct(field, filter)))
    }

    pub fn count(&self, filter: &Filter) -> StoreResult<usize> {
        self.backend
            .read(&self.name, |set| Ok(set.find_ids(filter).len()))
    }

    /// Replaces foreign ids in `field` with the referenced documents.
    ///
    /// A scalar id becomes the document or `null`; an array keeps the found
    /// documents in order and drops the rest. `docs` is not modified.
    pub fn populate(
        &self,
        docs: &[Document],
        field: &str,
        foreign_collection: &str,
    ) -> StoreResult<Vec<Document>> {
        validate_collection_name(foreign_collection)?;
        let foreign: HashMap<RecordId, Document> = self.backend.read(foreign_collection, |set| {
            Ok(set
                .iter()
                .filter_map(|doc| doc.id().map(|id| (id, doc.clone())))
                .collect())
        })?;
        let resolve = |value: &Value| {
            RecordId::from_value(value).and_then(|id| foreign.get(&id).cloned())
        };

        Ok(docs
            .iter()
            .map(|doc| {
                let mut copy = doc.clone();
                let replacement = match doc.get(field) {
                    None => return copy,
                    Some(Value::Array(items)) => Value::Array(
                        items
                            .iter()
                            .filter_map(|item| resolve(item).map(Document::into_value))
                            .collect(),
                    ),
                    Some(value) => resolve(value).map_or(Value::Null, Document::into_value),
                };
                copy.set(field, replacement);
                copy
            })
            .collect())
    }

    /// Runs `mutate` on this collection, then the relationship rules for
    /// whatever it journaled, then `finish` on the synced set.
    fn write<T, F, R>(&self, mutate: F, finish: R) -> StoreResult<T>
    where
        F: FnOnce(&mut DocumentSet) -> StoreResult<T>,
        R: FnOnce(&DocumentSet, T) -> T,
    {
        let name = self.name.as_str();
        let counterpart = match name {
            LICENSES => SYSTEMS,
            SYSTEMS => LICENSES,
            _ => {
                return self.backend.transact(&[name], |workspace| {
                    let set = workspace.collection_mut(name)?;
                    let value = mutate(set)?;
                    Ok(finish(set, value))
                })
            }
        };

        self.backend.transact(&[name, counterpart], |workspace| {
            let (own, other) = workspace.pair_mut(name, counterpart)?;
            let value = mutate(own)?;
            let changes = own.changes().to_vec();
            if name == LICENSES {
                licenses_changed(own, other, &changes);
            } else {
                systems_changed(other, own, &changes);
            }
            Ok(finish(own, value))
        })
    }
}

fn refreshed(set: &DocumentSet, doc: Document) -> Document {
    doc.id()
        .and_then(|id| set.find_by_id(&id).cloned())
        .unwrap_or(doc)
}
