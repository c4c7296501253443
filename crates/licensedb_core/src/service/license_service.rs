//! License use-case service.
//!
//! # Responsibility
//! - Provide License CRUD entry points that keep Systems in sync.
//! - Derive seat usage from `assignedSystems`.
//!
//! # Invariants
//! - Returned documents reflect the post-sync state (normalized
//!   `assignedSystems`, refreshed `updatedAt`).

use crate::model::document::Document;
use crate::model::id::RecordId;
use crate::model::relation::{assigned_systems, LICENSES, SYSTEMS};
use crate::query::Filter;
use crate::service::{ServiceError, ServiceResult};
use crate::store::Backend;
use crate::sync::{license_deleted, license_saved};
use crate::update::Modifiers;
use serde_json::{Map, Value};

/// Use-case service for License records.
pub struct LicenseService<'a, B: Backend> {
    backend: &'a B,
}

impl<'a, B: Backend> LicenseService<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Creates a License and adds its requirement entry to every assigned System.
    pub fn create_license(&self, doc: Document) -> ServiceResult<Document> {
        let stored = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (licenses, systems) = workspace.pair_mut(LICENSES, SYSTEMS)?;
            let created = licenses.create(doc)?;
            let Some(id) = created.id() else {
                return Ok(created);
            };
            license_saved(licenses, systems, &id);
            Ok(licenses.find_by_id(&id).cloned().unwrap_or(created))
        })?;
        Ok(stored)
    }

    /// Shallow-merges `patch` and re-synchronizes Systems.
    ///
    /// Returns `Ok(None)` when no License has `id`.
    pub fn update_license(
        &self,
        id: &RecordId,
        patch: Map<String, Value>,
    ) -> ServiceResult<Option<Document>> {
        let stored = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (licenses, systems) = workspace.pair_mut(LICENSES, SYSTEMS)?;
            if licenses.update(id, &patch).is_none() {
                return Ok(None);
            }
            license_saved(licenses, systems, id);
            Ok(licenses.find_by_id(id).cloned())
        })?;
        Ok(stored)
    }

    /// Applies modifiers to every matching License; returns how many changed.
    pub fn update_licenses(&self, filter: &Filter, modifiers: &Modifiers) -> ServiceResult<usize> {
        let count = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (licenses, systems) = workspace.pair_mut(LICENSES, SYSTEMS)?;
            let ids = licenses.find_ids(filter);
            let count = licenses.update_many(filter, modifiers)?;
            for id in &ids {
                license_saved(licenses, systems, id);
            }
            Ok(count)
        })?;
        Ok(count)
    }

    /// Deletes a License and its requirement entries on every System.
    pub fn delete_license(&self, id: &RecordId) -> ServiceResult<bool> {
        let removed = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (licenses, systems) = workspace.pair_mut(LICENSES, SYSTEMS)?;
            if !licenses.delete(id) {
                return Ok(false);
            }
            license_deleted(systems, id);
            Ok(true)
        })?;
        Ok(removed)
    }

    /// Deletes every matching License; returns how many.
    pub fn delete_licenses(&self, filter: &Filter) -> ServiceResult<usize> {
        let count = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (licenses, systems) = workspace.pair_mut(LICENSES, SYSTEMS)?;
            let ids = licenses.find_ids(filter);
            let count = licenses.delete_many(filter);
            for id in &ids {
                license_deleted(systems, id);
            }
            Ok(count)
        })?;
        Ok(count)
    }

    pub fn get_license(&self, id: &RecordId) -> ServiceResult<Option<Document>> {
        Ok(self.backend.collection(LICENSES).find_by_id(id)?)
    }

    pub fn list_licenses(&self, filter: &Filter) -> ServiceResult<Vec<Document>> {
        Ok(self.backend.collection(LICENSES).find(filter)?)
    }

    /// Number of Systems the License is assigned to.
    pub fn used_seats(&self, id: &RecordId) -> ServiceResult<usize> {
        let license = self
            .get_license(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        Ok(assigned_systems(&license).len())
    }
}
