//! Collection storage: the in-memory engine, its two backends, and the facade.
//!
//! # Responsibility
//! - Define the `Backend` contract: read one collection, or mutate several
//!   inside one serialized critical section.
//! - Provide the flat-file backend (`JsonBackend`) and the schema-validated
//!   database backend (`SqliteBackend`) behind one `Database` facade.
//!
//! # Invariants
//! - Writers to a collection are serialized; a transaction either persists
//!   every dirty collection it opened or none of them.
//! - Callers never observe which backend answered.

mod error;
mod facade;
pub mod file;
mod json;
pub mod legacy;
pub mod schema;
mod set;
mod sqlite;

pub use crate::config::BackendKind;
pub use error::{StoreError, StoreResult};
pub use facade::{Collection, Database};
pub use json::JsonBackend;
pub use set::{Change, DocumentSet};
pub use sqlite::SqliteBackend;

const MAX_COLLECTION_NAME_LEN: usize = 64;

/// Storage engine contract shared by both backends.
pub trait Backend {
    /// Which engine this is.
    fn kind(&self) -> BackendKind;

    /// Runs `read` against a consistent snapshot of one collection.
    fn read<T, F>(&self, collection: &str, read: F) -> StoreResult<T>
    where
        F: FnOnce(&DocumentSet) -> StoreResult<T>;

    /// Runs `body` with exclusive access to every named collection.
    ///
    /// Dirty collections are persisted after `body` succeeds. When `body`
    /// fails nothing is persisted.
    fn transact<T, F>(&self, collections: &[&str], body: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Workspace) -> StoreResult<T>;

    /// Per-collection CRUD handle.
    fn collection<'a>(&'a self, name: &str) -> Collection<'a, Self>
    where
        Self: Sized,
    {
        Collection::new(self, name)
    }
}

/// Collections opened by one transaction.
#[derive(Debug, Default)]
pub struct Workspace {
    sets: Vec<DocumentSet>,
}

impl Workspace {
    pub(crate) fn new(sets: Vec<DocumentSet>) -> Self {
        Self { sets }
    }

    pub(crate) fn into_sets(self) -> Vec<DocumentSet> {
        self.sets
    }

    pub fn collection(&self, name: &str) -> StoreResult<&DocumentSet> {
        self.sets
            .iter()
            .find(|set| set.name() == name)
            .ok_or_else(|| StoreError::CollectionNotOpened(name.to_string()))
    }

    pub fn collection_mut(&mut self, name: &str) -> StoreResult<&mut DocumentSet> {
        self.sets
            .iter_mut()
            .find(|set| set.name() == name)
            .ok_or_else(|| StoreError::CollectionNotOpened(name.to_string()))
    }

    /// Two distinct collections borrowed mutably at once, in argument order.
    pub fn pair_mut(
        &mut self,
        first: &str,
        second: &str,
    ) -> StoreResult<(&mut DocumentSet, &mut DocumentSet)> {
        let first_index = self.index_of(first)?;
        let second_index = self.index_of(second)?;
        if first_index == second_index {
            return Err(StoreError::InvalidCollectionName(second.to_string()));
        }

        if first_index < second_index {
            let (head, tail) = self.sets.split_at_mut(second_index);
            Ok((&mut head[first_index], &mut tail[0]))
        } else {
            let (head, tail) = self.sets.split_at_mut(first_index);
            Ok((&mut tail[0], &mut head[second_index]))
        }
    }

    fn index_of(&self, name: &str) -> StoreResult<usize> {
        self.sets
            .iter()
            .position(|set| set.name() == name)
            .ok_or_else(|| StoreError::CollectionNotOpened(name.to_string()))
    }
}

/// Validates one collection name.
///
/// Names become file names and SQL keys: 1-64 chars of `[a-z0-9_-]`.
pub fn validate_collection_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

/// Validated, sorted, de-duplicated names; sorted order is the lock order.
pub(crate) fn lock_order(collections: &[&str]) -> StoreResult<Vec<String>> {
    let mut names = Vec::with_capacity(collections.len());
    for name in collections {
        validate_collection_name(name)?;
        names.push((*name).to_string());
    }
    names.sort();
    names.dedup();
    Ok(names)
}
