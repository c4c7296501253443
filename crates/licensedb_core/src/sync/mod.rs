//! License<->System relationship synchronization.
//!
//! # Responsibility
//! - Keep `License.assignedSystems` and `System.licenseRequirements[].licenseId`
//!   mirror images of each other after every write.
//! - Repair and diagnose drift left behind by interrupted commits or by
//!   writers that bypassed this crate.
//!
//! # Invariants
//! - For every License `L` and System `S`:
//!   `S.id in L.assignedSystems <=> some r in S.licenseRequirements has r.licenseId == L.id`.
//! - Every function here is idempotent.
//! - Functions operate on already-opened sets; callers run them inside the
//!   same transaction as the triggering write.
//!
//! # See also
//! - `crate::service` and `crate::store::Collection` for the write paths that
//!   call into this module.

mod check;
mod relationship;

pub use check::{check_symmetry, repair, RepairReport, SymmetryViolation};
pub use relationship::{
    license_deleted, license_saved, licenses_changed, system_deleted, system_saved,
    systems_changed,
};

/// Counters describing what one synchronization step changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Requirement entries appended to Systems.
    pub requirements_added: usize,
    /// Requirement entries removed from Systems.
    pub requirements_removed: usize,
    /// System ids appended to `assignedSystems`.
    pub assignments_added: usize,
    /// System ids removed from `assignedSystems`.
    pub assignments_removed: usize,
    /// References to records that do not exist, dropped or unlinked.
    pub dangling_dropped: usize,
    /// Repeated references collapsed to their first occurrence.
    pub duplicates_collapsed: usize,
}

impl SyncOutcome {
    /// Whether nothing was changed.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }

    pub fn absorb(&mut self, other: SyncOutcome) {
        self.requirements_added += other.requirements_added;
        self.requirements_removed += other.requirements_removed;
        self.assignments_added += other.assignments_added;
        self.assignments_removed += other.assignments_removed;
        self.dangling_dropped += other.dangling_dropped;
        self.duplicates_collapsed += other.duplicates_collapsed;
    }
}
