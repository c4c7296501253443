//! System use-case service.
//!
//! # Responsibility
//! - Provide System CRUD entry points that keep Licenses in sync.
//! - Answer "which Licenses cover this System" by query over Licenses.
//!
//! # Invariants
//! - Editing `licenseRequirements` directly is propagated back into
//!   `License.assignedSystems` in the same transaction.

use crate::model::document::Document;
use crate::model::id::RecordId;
use crate::model::relation::{ASSIGNED_SYSTEMS, LICENSES, SYSTEMS};
use crate::query::Filter;
use crate::service::{ServiceError, ServiceResult};
use crate::store::Backend;
use crate::sync::{system_deleted, system_saved};
use crate::update::Modifiers;
use serde_json::{Map, Value};

/// Use-case service for System records.
pub struct SystemService<'a, B: Backend> {
    backend: &'a B,
}

impl<'a, B: Backend> SystemService<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub fn create_system(&self, doc: Document) -> ServiceResult<Document> {
        let stored = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (systems, licenses) = workspace.pair_mut(SYSTEMS, LICENSES)?;
            let created = systems.create(doc)?;
            let Some(id) = created.id() else {
                return Ok(created);
            };
            system_saved(licenses, systems, &id);
            Ok(systems.find_by_id(&id).cloned().unwrap_or(created))
        })?;
        Ok(stored)
    }

    /// Returns `Ok(None)` when no System has `id`.
    pub fn update_system(
        &self,
        id: &RecordId,
        patch: Map<String, Value>,
    ) -> ServiceResult<Option<Document>> {
        let stored = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (systems, licenses) = workspace.pair_mut(SYSTEMS, LICENSES)?;
            if systems.update(id, &patch).is_none() {
                return Ok(None);
            }
            system_saved(licenses, systems, id);
            Ok(systems.find_by_id(id).cloned())
        })?;
        Ok(stored)
    }

    pub fn update_systems(&self, filter: &Filter, modifiers: &Modifiers) -> ServiceResult<usize> {
        let count = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (systems, licenses) = workspace.pair_mut(SYSTEMS, LICENSES)?;
            let ids = systems.find_ids(filter);
            let count = systems.update_many(filter, modifiers)?;
            for id in &ids {
                system_saved(licenses, systems, id);
            }
            Ok(count)
        })?;
        Ok(count)
    }

    pub fn delete_system(&self, id: &RecordId) -> ServiceResult<bool> {
        let removed = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (systems, licenses) = workspace.pair_mut(SYSTEMS, LICENSES)?;
            if !systems.delete(id) {
                return Ok(false);
            }
            system_deleted(licenses, id);
            Ok(true)
        })?;
        Ok(removed)
    }

    pub fn delete_systems(&self, filter: &Filter) -> ServiceResult<usize> {
        let count = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (systems, licenses) = workspace.pair_mut(SYSTEMS, LICENSES)?;
            let ids = systems.find_ids(filter);
            let count = systems.delete_many(filter);
            for id in &ids {
                system_deleted(licenses, id);
            }
            Ok(count)
        })?;
        Ok(count)
    }

    pub fn get_system(&self, id: &RecordId) -> ServiceResult<Option<Document>> {
        Ok(self.backend.collection(SYSTEMS).find_by_id(id)?)
    }

    pub fn list_systems(&self, filter: &Filter) -> ServiceResult<Vec<Document>> {
        Ok(self.backend.collection(SYSTEMS).find(filter)?)
    }

    /// Licenses whose `assignedSystems` lists the System.
    ///
    /// Fails with `NotFound` when the System itself does not exist.
    pub fn licenses_for_system(&self, id: &RecordId) -> ServiceResult<Vec<Document>> {
        if self.get_system(id)?.is_none() {
            return Err(ServiceError::NotFound(id.clone()));
        }
        let filter = Filter::new().eq(ASSIGNED_SYSTEMS, id.to_value());
        Ok(self.backend.collection(LICENSES).find(&filter)?)
    }
}
