//! License/System record conventions.
//!
//! # Responsibility
//! - Name the collections and fields that carry the License<->System
//!   assignment.
//! - Provide typed views over the assignment fields of raw documents.
//!
//! # Invariants
//! - `assignedSystems` holds System ids without duplicates.
//! - A requirement without `licenseId` is unassigned and never synchronized.

use crate::model::document::Document;
use crate::model::id::{ids_equal, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const LICENSES: &str = "licenses";
pub const SYSTEMS: &str = "systems";
pub const USERS: &str = "users";
pub const VENDORS: &str = "vendors";

pub const ASSIGNED_SYSTEMS: &str = "assignedSystems";
pub const LICENSE_REQUIREMENTS: &str = "licenseRequirements";
pub const LICENSE_ID: &str = "licenseId";
pub const LICENSE_TYPE: &str = "licenseType";
pub const QUANTITY: &str = "quantity";

/// One entry of a System's `licenseRequirements`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRequirement {
    #[serde(default)]
    pub license_type: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_id: Option<RecordId>,
}

fn default_quantity() -> u32 {
    1
}

impl LicenseRequirement {
    /// Requirement entry that back-references `license`.
    pub fn for_license(license: &Document, license_id: &RecordId) -> Self {
        Self {
            license_type: license_type_of(license),
            quantity: 1,
            license_id: Some(license_id.clone()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}

/// Label copied into new requirement entries: `licenseType`, then `name`.
pub fn license_type_of(license: &Document) -> String {
    [LICENSE_TYPE, "name"]
        .iter()
        .find_map(|field| license.get(field).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Raw `assignedSystems` entries of a License, or empty when absent.
pub fn assigned_systems(license: &Document) -> &[Value] {
    license
        .get(ASSIGNED_SYSTEMS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Raw `licenseRequirements` entries of a System, or empty when absent.
pub fn license_requirements(system: &Document) -> &[Value] {
    system
        .get(LICENSE_REQUIREMENTS)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Whether one raw requirement entry points at `license_id`.
pub fn requirement_points_at(entry: &Value, license_id: &RecordId) -> bool {
    entry
        .get(LICENSE_ID)
        .is_some_and(|value| license_id.matches(value))
}

/// Whether a License lists `system_id` in `assignedSystems`.
pub fn is_assigned(license: &Document, system_id: &RecordId) -> bool {
    assigned_systems(license)
        .iter()
        .any(|value| ids_equal(value, &system_id.to_value()))
}

#[cfg(test)]
mod tests {
    use super::{license_type_of, LicenseRequirement};
    use crate::model::document::Document;
    use crate::model::id::RecordId;
    use serde_json::json;

    #[test]
    fn requirement_serializes_camel_case() {
        let license = Document::new().with("licenseType", json!("Office"));
        let entry = LicenseRequirement::for_license(&license, &RecordId::from("l1"));
        assert_eq!(
            entry.to_value(),
            json!({"licenseType": "Office", "quantity": 1, "licenseId": "l1"})
        );
    }

    #[test]
    fn license_type_falls_back_to_name() {
        let license = Document::new().with("name", json!("Photoshop"));
        assert_eq!(license_type_of(&license), "Photoshop");
        assert_eq!(license_type_of(&Document::new()), "");
    }
}
