//! Whole-collection repair and symmetry diagnostics.

use crate::model::id::RecordId;
use crate::model::relation::{assigned_systems, license_requirements, LICENSE_ID};
use crate::store::DocumentSet;
use crate::sync::relationship::{license_saved, normalize_requirements};
use crate::sync::SyncOutcome;
use log::info;
use std::fmt::{Display, Formatter};

/// Summary of one [`repair`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub licenses_checked: usize,
    pub systems_checked: usize,
    pub outcome: SyncOutcome,
}

/// One broken link between the two sides of the relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymmetryViolation {
    /// License lists the System, System has no entry for the License.
    MissingRequirement {
        license_id: RecordId,
        system_id: RecordId,
    },
    /// System has an entry for the License, License does not list it.
    MissingAssignment {
        license_id: RecordId,
        system_id: RecordId,
    },
    /// License lists a System that does not exist.
    UnknownSystem {
        license_id: RecordId,
        system_id: RecordId,
    },
    /// System references a License that does not exist.
    UnknownLicense {
        system_id: RecordId,
        license_id: RecordId,
    },
}

impl Display for SymmetryViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequirement {
                license_id,
                system_id,
            } => write!(
                f,
                "license {license_id} assigns system {system_id}, which has no requirement for it"
            ),
            Self::MissingAssignment {
                license_id,
                system_id,
            } => write!(
                f,
                "system {system_id} requires license {license_id}, which does not assign it"
            ),
            Self::UnknownSystem {
                license_id,
                system_id,
            } => write!(f, "license {license_id} assigns unknown system {system_id}"),
            Self::UnknownLicense {
                system_id,
                license_id,
            } => write!(f, "system {system_id} requires unknown license {license_id}"),
        }
    }
}

/// Rebuilds both sides of the relationship with Licenses as the source of truth.
///
/// Systems are cleaned first (unknown and repeated `licenseId`s), then every
/// License is re-propagated. Afterwards [`check_symmetry`] reports nothing.
pub fn repair(licenses: &mut DocumentSet, systems: &mut DocumentSet) -> RepairReport {
    let mut report = RepairReport::default();

    for system_id in systems.ids() {
        let (_, outcome) = normalize_requirements(licenses, systems, &system_id);
        report.outcome.absorb(outcome);
        report.systems_checked += 1;
    }
    for license_id in licenses.ids() {
        let outcome = license_saved(licenses, systems, &license_id);
        report.outcome.absorb(outcome);
        report.licenses_checked += 1;
    }

    info!(
        "event=sync_repair module=sync status=ok licenses={} systems={} requirements_added={} requirements_removed={} dangling_dropped={} duplicates_collapsed={}",
        report.licenses_checked,
        report.systems_checked,
        report.outcome.requirements_added,
        report.outcome.requirements_removed,
        report.outcome.dangling_dropped,
        report.outcome.duplicates_collapsed
    );
    report
}

/// Lists every place where the two sides disagree. Read-only.
pub fn check_symmetry(licenses: &DocumentSet, systems: &DocumentSet) -> Vec<SymmetryViolation> {
    let mut violations = Vec::new();

    for license in licenses.iter() {
        let Some(license_id) = license.id() else {
            continue;
        };
        let mut seen: Vec<RecordId> = Vec::new();
        for entry in assigned_systems(license) {
            let Some(system_id) = RecordId::from_value(entry) else {
                continue;
            };
            if seen.contains(&system_id) {
                continue;
            }
            match systems.find_by_id(&system_id) {
                None => violations.push(SymmetryViolation::UnknownSystem {
                    license_id: license_id.clone(),
                    system_id: system_id.clone(),
                }),
                Some(system) => {
                    let mirrored = license_requirements(system)
                        .iter()
                        .any(|entry| requirement_license(entry).as_ref() == Some(&license_id));
                    if !mirrored {
                        violations.push(SymmetryViolation::MissingRequirement {
                            license_id: license_id.clone(),
                            system_id: system_id.clone(),
                        });
                    }
                }
            }
            seen.push(system_id);
        }
    }

    for system in systems.iter() {
        let Some(system_id) = system.id() else {
            continue;
        };
        let mut seen: Vec<RecordId> = Vec::new();
        for license_id in license_requirements(system).iter().filter_map(requirement_license) {
            if seen.contains(&license_id) {
                continue;
            }
            match licenses.find_by_id(&license_id) {
                None => violations.push(SymmetryViolation::UnknownLicense {
                    system_id: system_id.clone(),
                    license_id: license_id.clone(),
                }),
                Some(license) => {
                    let listed = assigned_systems(license)
                        .iter()
                        .any(|value| system_id.matches(value));
                    if !listed {
                        violations.push(SymmetryViolation::MissingAssignment {
                            license_id: license_id.clone(),
                            system_id: system_id.clone(),
                        });
                    }
                }
            }
            seen.push(license_id);
        }
    }

    violations
}

fn requirement_license(entry: &serde_json::Value) -> Option<RecordId> {
    entry.get(LICENSE_ID).and_then(RecordId::from_value)
}
