//! Per-write propagation rules.

use crate::model::document::Document;
use crate::model::id::{ids_equal, RecordId};
use crate::model::relation::{
    is_assigned, license_requirements, requirement_points_at, LicenseRequirement,
    ASSIGNED_SYSTEMS, LICENSE_ID, LICENSE_REQUIREMENTS,
};
use crate::store::{Change, DocumentSet};
use crate::sync::SyncOutcome;
use log::{debug, warn};
use serde_json::Value;

/// Propagates a created or updated License into every System.
///
/// The License's `assignedSystems` is normalized first: empty, duplicate
/// and unknown System ids are dropped. Assigned Systems then gain one
/// requirement entry for the License; all other Systems lose theirs.
pub fn license_saved(
    licenses: &mut DocumentSet,
    systems: &mut DocumentSet,
    license_id: &RecordId,
) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let Some(license) = licenses.find_by_id(license_id).cloned() else {
        return outcome;
    };

    let mut assigned: Vec<RecordId> = Vec::new();
    let mut kept = Vec::new();
    for entry in id_entries(license.get(ASSIGNED_SYSTEMS)) {
        let Some(system_id) = RecordId::from_value(&entry) else {
            outcome.dangling_dropped += 1;
            continue;
        };
        if assigned.contains(&system_id) {
            outcome.duplicates_collapsed += 1;
            continue;
        }
        if !systems.contains(&system_id) {
            warn!(
                "event=sync_apply module=sync status=drop trigger=license_saved license_id={} system_id={} reason=unknown_system",
                license_id, system_id
            );
            outcome.dangling_dropped += 1;
            continue;
        }
        assigned.push(system_id);
        kept.push(entry);
    }

    let normalized = Value::Array(kept);
    let rewrite = match license.get(ASSIGNED_SYSTEMS) {
        None | Some(Value::Null) => false,
        Some(current) => *current != normalized,
    };
    if rewrite {
        licenses.update_with(license_id, |doc| {
            doc.set(ASSIGNED_SYSTEMS, normalized);
            true
        });
    }

    let requirement = LicenseRequirement::for_license(&license, license_id).to_value();
    for system_id in systems.ids() {
        let wanted = assigned.contains(&system_id);
        systems.update_with(&system_id, |system| {
            let present = license_requirements(system)
                .iter()
                .any(|entry| requirement_points_at(entry, license_id));
            if wanted && !present {
                push_entry(system, LICENSE_REQUIREMENTS, requirement.clone());
                outcome.requirements_added += 1;
                true
            } else if !wanted && present {
                outcome.requirements_removed += remove_requirements(system, license_id);
                true
            } else {
                false
            }
        });
    }

    log_outcome("license_saved", license_id, &outcome);
    outcome
}

/// Removes every requirement entry that points at a deleted License.
pub fn license_deleted(systems: &mut DocumentSet, license_id: &RecordId) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    for system_id in systems.ids() {
        systems.update_with(&system_id, |system| {
            let removed = remove_requirements(system, license_id);
            outcome.requirements_removed += removed;
            removed > 0
        });
    }
    log_outcome("license_deleted", license_id, &outcome);
    outcome
}

/// Propagates a created or updated System back into every License.
///
/// Requirement entries naming an unknown License lose their `licenseId`;
/// repeated `licenseId`s collapse to the first entry. Referenced Licenses
/// then list the System in `assignedSystems`; all others stop listing it.
pub fn system_saved(
    licenses: &mut DocumentSet,
    systems: &mut DocumentSet,
    system_id: &RecordId,
) -> SyncOutcome {
    let (referenced, mut outcome) = normalize_requirements(licenses, systems, system_id);
    let Some(referenced) = referenced else {
        return outcome;
    };

    let system_value = system_id.to_value();
    for license_id in licenses.ids() {
        let wanted = referenced.contains(&license_id);
        licenses.update_with(&license_id, |license| {
            let present = is_assigned(license, system_id);
            if wanted && !present {
                push_entry(license, ASSIGNED_SYSTEMS, system_value.clone());
                outcome.assignments_added += 1;
                true
            } else if !wanted && present {
                outcome.assignments_removed += remove_assignment(license, &system_value);
                true
            } else {
                false
            }
        });
    }

    log_outcome("system_saved", system_id, &outcome);
    outcome
}

/// Removes a deleted System from every License's `assignedSystems`.
pub fn system_deleted(licenses: &mut DocumentSet, system_id: &RecordId) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let system_value = system_id.to_value();
    for license_id in licenses.ids() {
        licenses.update_with(&license_id, |license| {
            let removed = remove_assignment(license, &system_value);
            outcome.assignments_removed += removed;
            removed > 0
        });
    }
    log_outcome("system_deleted", system_id, &outcome);
    outcome
}

/// Replays a License journal through `license_saved` / `license_deleted`.
pub fn licenses_changed(
    licenses: &mut DocumentSet,
    systems: &mut DocumentSet,
    changes: &[Change],
) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    for change in changes {
        match change {
            Change::Upsert(id) => outcome.absorb(license_saved(licenses, systems, id)),
            Change::Remove(id) => outcome.absorb(license_deleted(systems, id)),
        }
    }
    outcome
}

/// Replays a System journal through `system_saved` / `system_deleted`.
pub fn systems_changed(
    licenses: &mut DocumentSet,
    systems: &mut DocumentSet,
    changes: &[Change],
) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    for change in changes {
        match change {
            Change::Upsert(id) => outcome.absorb(system_saved(licenses, systems, id)),
            Change::Remove(id) => outcome.absorb(system_deleted(licenses, id)),
        }
    }
    outcome
}

/// Cleans one System's requirement list against the current Licenses.
///
/// Returns the License ids the System still references, in entry order, or
/// `None` when the System does not exist.
pub(crate) fn normalize_requirements(
    licenses: &DocumentSet,
    systems: &mut DocumentSet,
    system_id: &RecordId,
) -> (Option<Vec<RecordId>>, SyncOutcome) {
    let mut outcome = SyncOutcome::default();
    let Some(system) = systems.find_by_id(system_id) else {
        return (None, outcome);
    };

    let mut referenced: Vec<RecordId> = Vec::new();
    let mut entries = Vec::new();
    let mut changed = false;
    for entry in license_requirements(system) {
        let Some(value) = entry.get(LICENSE_ID).filter(|value| !value.is_null()) else {
            entries.push(entry.clone());
            continue;
        };
        match RecordId::from_value(value) {
            Some(license_id) if referenced.contains(&license_id) => {
                outcome.duplicates_collapsed += 1;
                changed = true;
            }
            Some(license_id) if licenses.contains(&license_id) => {
                referenced.push(license_id);
                entries.push(entry.clone());
            }
            _ => {
                warn!(
                    "event=sync_apply module=sync status=drop trigger=system_saved system_id={} license_id={} reason=unknown_license",
                    system_id, value
                );
                let mut unlinked = entry.clone();
                if let Some(fields) = unlinked.as_object_mut() {
                    fields.remove(LICENSE_ID);
                }
                entries.push(unlinked);
                outcome.dangling_dropped += 1;
                changed = true;
            }
        }
    }

    if changed {
        systems.update_with(system_id, |doc| {
            doc.set(LICENSE_REQUIREMENTS, Value::Array(entries));
            true
        });
    }
    (Some(referenced), outcome)
}

/// Entries of an id-list field; a lone scalar counts as a one-item list.
fn id_entries(value: Option<&Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

fn push_entry(doc: &mut Document, field: &str, entry: Value) {
    let mut items = id_entries(doc.get(field));
    items.push(entry);
    doc.set(field, Value::Array(items));
}

fn remove_requirements(system: &mut Document, license_id: &RecordId) -> usize {
    let Some(items) = system
        .get_mut(LICENSE_REQUIREMENTS)
        .and_then(Value::as_array_mut)
    else {
        return 0;
    };
    let before = items.len();
    items.retain(|entry| !requirement_points_at(entry, license_id));
    before - items.len()
}

fn remove_assignment(license: &mut Document, system_value: &Value) -> usize {
    let Some(items) = license
        .get_mut(ASSIGNED_SYSTEMS)
        .and_then(Value::as_array_mut)
    else {
        return 0;
    };
    let before = items.len();
    items.retain(|entry| !ids_equal(entry, system_value));
    before - items.len()
}

fn log_outcome(trigger: &str, id: &RecordId, outcome: &SyncOutcome) {
    if outcome.is_noop() {
        return;
    }
    debug!(
        "event=sync_apply module=sync status=ok trigger={} id={} requirements_added={} requirements_removed={} assignments_added={} assignments_removed={} dangling_dropped={}",
        trigger,
        id,
        outcome.requirements_added,
        outcome.requirements_removed,
        outcome.assignments_added,
        outcome.assignments_removed,
        outcome.dangling_dropped
    );
}
