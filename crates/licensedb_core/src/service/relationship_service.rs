//! Whole-store relationship maintenance.

use crate::model::relation::{LICENSES, SYSTEMS};
use crate::service::ServiceResult;
use crate::store::Backend;
use crate::sync::{check_symmetry, repair, RepairReport, SymmetryViolation};

/// Repair and diagnostics over both collections.
pub struct RelationshipService<'a, B: Backend> {
    backend: &'a B,
}

impl<'a, B: Backend> RelationshipService<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Rebuilds System back-references from the License side.
    pub fn repair(&self) -> ServiceResult<RepairReport> {
        let report = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            let (licenses, systems) = workspace.pair_mut(LICENSES, SYSTEMS)?;
            Ok(repair(licenses, systems))
        })?;
        Ok(report)
    }

    /// Lists symmetry violations from one consistent snapshot of both sides.
    pub fn check(&self) -> ServiceResult<Vec<SymmetryViolation>> {
        let violations = self.backend.transact(&[LICENSES, SYSTEMS], |workspace| {
            Ok(check_symmetry(
                workspace.collection(LICENSES)?,
                workspace.collection(SYSTEMS)?,
            ))
        })?;
        Ok(violations)
    }
}
