//! In-memory collection: the canonical representation every backend loads.
//!
//! # Responsibility
//! - Run the CRUD surface against an ordered document array.
//! - Journal which ids changed so backends persist only what moved.
//!
//! # Invariants
//! - Every document carries a non-empty, collection-unique `id`.
//! - Document order is insertion (file) order.
//! - Multi-document operations are all-or-nothing: on error the set is
//!   unchanged.

use crate::model::document::{now_timestamp, Document, FIELD_CREATED_AT, FIELD_UPDATED_AT};
use crate::model::id::{generate_id, RecordId};
use crate::query::{matches, Filter};
use crate::store::error::{StoreError, StoreResult};
use crate::update::Modifiers;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One journaled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Upsert(RecordId),
    Remove(RecordId),
}

/// Ordered documents of one collection plus its change journal.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    name: String,
    documents: Vec<Document>,
    changes: Vec<Change>,
}

impl DocumentSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a set from persisted documents.
    ///
    /// Returns a human-readable reason when the data violates the id
    /// invariants; loaders wrap it in their own corruption error.
    pub fn load(name: impl Into<String>, documents: Vec<Document>) -> Result<Self, String> {
        let mut seen = HashSet::new();
        for (index, doc) in documents.iter().enumerate() {
            let id = doc
                .id()
                .ok_or_else(|| format!("document #{index} has no id"))?;
            if !seen.insert(id.clone()) {
                return Err(format!("duplicate document id `{id}`"));
            }
        }
        Ok(Self {
            name: name.into(),
            documents,
            changes: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Ids of all documents, in order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.documents.iter().filter_map(Document::id).collect()
    }

    /// All matching documents, in order. An empty filter returns everything.
    pub fn find(&self, filter: &Filter) -> Vec<Document> {
        self.documents
            .iter()
            .filter(|doc| matches(doc, filter))
            .cloned()
            .collect()
    }

    /// Ids of matching documents, in order.
    pub fn find_ids(&self, filter: &Filter) -> Vec<RecordId> {
        self.documents
            .iter()
            .filter(|doc| matches(doc, filter))
            .filter_map(Document::id)
            .collect()
    }

    pub fn find_by_id(&self, id: &RecordId) -> Option<&Document> {
        self.position(id).map(|index| &self.documents[index])
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.documents
            .iter()
            .position(|doc| doc.get("id").is_some_and(|value| id.matches(value)))
    }

    /// Stores a new document, assigning an id when missing.
    pub fn create(&mut self, doc: Document) -> StoreResult<Document> {
        let now = now_timestamp();
        let prepared = self.prepare_new(doc, &now, &HashSet::new())?;
        Ok(self.push(prepared))
    }

    /// Stores every document or none of them.
    pub fn insert_many(&mut self, docs: Vec<Document>) -> StoreResult<Vec<Document>> {
        let now = now_timestamp();
        let mut batch_ids = HashSet::new();
        let mut prepared = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc = self.prepare_new(doc, &now, &batch_ids)?;
            if let Some(id) = doc.id() {
                batch_ids.insert(id);
            }
            prepared.push(doc);
        }
        Ok(prepared.into_iter().map(|doc| self.push(doc)).collect())
    }

    /// Inserts already-stamped documents, keeping their timestamps.
    ///
    /// Used by imports; missing timestamps are filled in.
    pub(crate) fn restore_many(&mut self, docs: Vec<Document>) -> StoreResult<usize> {
        let now = now_timestamp();
        let mut batch_ids = HashSet::new();
        let mut prepared = Vec::with_capacity(docs.len());
        for doc in docs {
            let created_at = doc.get(FIELD_CREATED_AT).cloned();
            let updated_at = doc.get(FIELD_UPDATED_AT).cloned();
            let mut doc = self.prepare_new(doc, &now, &batch_ids)?;
            if let Some(value) = created_at {
                doc.set(FIELD_CREATED_AT, value);
            }
            if let Some(value) = updated_at {
                doc.set(FIELD_UPDATED_AT, value);
            }
            if let Some(id) = doc.id() {
                batch_ids.insert(id);
            }
            prepared.push(doc);
        }
        let count = prepared.len();
        for doc in prepared {
            self.push(doc);
        }
        Ok(count)
    }

    /// Shallow-merges `patch` onto the document with `id`.
    pub fn update(&mut self, id: &RecordId, patch: &Map<String, Value>) -> Option<Document> {
        let index = self.position(id)?;
        let doc = &mut self.documents[index];
        doc.merge(patch);
        doc.touch(&now_timestamp());
        let updated = doc.clone();
        self.record(Change::Upsert(id.clone()));
        Some(updated)
    }

    /// Applies modifiers to one document.
    pub fn modify(&mut self, id: &RecordId, modifiers: &Modifiers) -> StoreResult<Option<Document>> {
        let Some(index) = self.position(id) else {
            return Ok(None);
        };
        let mut candidate = self.documents[index].clone();
        modifiers.apply(&mut candidate, &now_timestamp())?;
        self.documents[index] = candidate.clone();
        self.record(Change::Upsert(id.clone()));
        Ok(Some(candidate))
    }

    /// Runs `mutate` on the document with `id`.
    ///
    /// `mutate` returns whether it changed anything; only then is `updatedAt`
    /// refreshed and the change journaled. Returns `None` when absent.
    pub fn update_with<F>(&mut self, id: &RecordId, mutate: F) -> Option<bool>
    where
        F: FnOnce(&mut Document) -> bool,
    {
        let index = self.position(id)?;
        let changed = mutate(&mut self.documents[index]);
        if changed {
            self.documents[index].touch(&now_timestamp());
            self.record(Change::Upsert(id.clone()));
        }
        Some(changed)
    }

    /// Applies modifiers to every matching document; returns how many.
    pub fn update_many(&mut self, filter: &Filter, modifiers: &Modifiers) -> StoreResult<usize> {
        let now = now_timestamp();
        let mut staged = Vec::new();
        for (index, doc) in self.documents.iter().enumerate() {
            if !matches(doc, filter) {
                continue;
            }
            let mut candidate = doc.clone();
            modifiers.apply(&mut candidate, &now)?;
            staged.push((index, candidate));
        }

        let count = staged.len();
        for (index, candidate) in staged {
            if let Some(id) = candidate.id() {
                self.record(Change::Upsert(id));
            }
            self.documents[index] = candidate;
        }
        Ok(count)
    }

    /// Removes the document with `id`; returns whether one was removed.
    pub fn delete(&mut self, id: &RecordId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let removed = self.documents.remove(index);
        if let Some(removed_id) = removed.id() {
            self.record(Change::Remove(removed_id));
        }
        true
    }

    /// Removes every matching document; returns how many.
    pub fn delete_many(&mut self, filter: &Filter) -> usize {
        let mut removed = Vec::new();
        self.documents.retain(|doc| {
            if matches(doc, filter) {
                removed.extend(doc.id());
                false
            } else {
                true
            }
        });
        let count = removed.len();
        for id in removed {
            self.record(Change::Remove(id));
        }
        count
    }

    /// Unique values of `field` across matching documents, first-seen order.
    ///
    /// Array values are flattened into their elements.
    pub fn distinct(&self, field: &str, filter: &Filter) -> Vec<Value> {
        let mut values: Vec<Value> = Vec::new();
        let mut push_unique = |value: &Value| {
            if !values.contains(value) {
                values.push(value.clone());
            }
        };
        for doc in self.documents.iter().filter(|doc| matches(doc, filter)) {
            match doc.get(field) {
                Some(Value::Array(items)) => items.iter().for_each(&mut push_unique),
                Some(value) => push_unique(value),
                None => {}
            }
        }
        values
    }

    fn prepare_new(
        &self,
        mut doc: Document,
        now: &str,
        batch_ids: &HashSet<RecordId>,
    ) -> StoreResult<Document> {
        let id = match doc.get("id").and_then(RecordId::from_value) {
            Some(id) => {
                if self.contains(&id) || batch_ids.contains(&id) {
                    return Err(StoreError::DuplicateId {
                        collection: self.name.clone(),
                        id,
                    });
                }
                id
            }
            None => loop {
                let candidate = generate_id();
                if !self.contains(&candidate) && !batch_ids.contains(&candidate) {
                    break candidate;
                }
            },
        };
        doc.stamp_new(&id, now);
        Ok(doc)
    }

    fn push(&mut self, doc: Document) -> Document {
        if let Some(id) = doc.id() {
            self.record(Change::Upsert(id));
        }
        self.documents.push(doc.clone());
        doc
    }

    fn record(&mut self, change: Change) {
        self.changes.push(change);
    }
}

#[cfg(test)]
mod tests {
    use super::{Change, DocumentSet};
    use crate::model::document::Document;
    use crate::model::id::RecordId;
    use crate::query::Filter;
    use crate::store::error::StoreError;
    use crate::update::Modifiers;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::try_from(value).unwrap()
    }

    #[test]
    fn create_assigns_id_and_timestamps() {
        let mut set = DocumentSet::new("licenses");
        let created = set.create(doc(json!({"vendor": "Microsoft"}))).unwrap();

        let id = created.id().expect("id assigned");
        assert!(created.created_at().is_some());
        assert_eq!(created.created_at(), created.updated_at());
        assert_eq!(set.find_by_id(&id), Some(&created));
        assert_eq!(set.changes(), &[Change::Upsert(id)]);
    }

    #[test]
    fn create_rejects_duplicate_caller_id() {
        let mut set = DocumentSet::new("licenses");
        set.create(doc(json!({"id": "l1"}))).unwrap();
        let err = set.create(doc(json!({"id": "l1"}))).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn insert_many_is_all_or_nothing() {
        let mut set = DocumentSet::new("systems");
        let err = set
            .insert_many(vec![doc(json!({"id": "s1"})), doc(json!({"id": "s1"}))])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
        assert!(set.is_empty());
        assert!(!set.is_dirty());
    }

    #[test]
    fn update_many_leaves_set_untouched_on_error() {
        let mut set = DocumentSet::new("systems");
        set.insert_many(vec![
            doc(json!({"id": "s1", "tags": []})),
            doc(json!({"id": "s2", "tags": "scalar"})),
        ])
        .unwrap();

        let err = set
            .update_many(&Filter::new(), &Modifiers::new().append("tags", json!("x")))
            .unwrap_err();
        assert!(matches!(err, StoreError::Update(_)));
        let first = set.find_by_id(&RecordId::from("s1")).unwrap();
        assert_eq!(first.get("tags"), Some(&json!([])));
    }

    #[test]
    fn delete_many_and_distinct() {
        let mut set = DocumentSet::new("licenses");
        set.insert_many(vec![
            doc(json!({"vendor": "Microsoft", "seats": ["a", "b"]})),
            doc(json!({"vendor": "Adobe", "seats": ["b", "c"]})),
            doc(json!({"vendor": "Microsoft"})),
        ])
        .unwrap();

        assert_eq!(
            set.distinct("vendor", &Filter::new()),
            vec![json!("Microsoft"), json!("Adobe")]
        );
        assert_eq!(
            set.distinct("seats", &Filter::new()),
            vec![json!("a"), json!("b"), json!("c")]
        );

        let removed = set.delete_many(&Filter::new().eq("vendor", json!("Microsoft")));
        assert_eq!(removed, 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn load_rejects_duplicate_and_missing_ids() {
        let dup = DocumentSet::load("x", vec![doc(json!({"id": "a"})), doc(json!({"id": "a"}))]);
        assert!(dup.unwrap_err().contains("duplicate"));
        let missing = DocumentSet::load("x", vec![doc(json!({"name": "n"}))]);
        assert!(missing.unwrap_err().contains("no id"));
    }

    #[test]
    fn update_with_only_touches_on_change() {
        let mut set = DocumentSet::new("systems");
        set.create(doc(json!({"id": "s1"}))).unwrap();
        let id = RecordId::from("s1");
        let before = set.changes().len();

        assert_eq!(set.update_with(&id, |_| false), Some(false));
        assert_eq!(set.changes().len(), before);
        assert_eq!(set.update_with(&RecordId::from("nope"), |_| true), None);
    }
}
