//! Update engine: partial mutations applied to documents.
//!
//! # Responsibility
//! - Shallow field replace-merge (`$set` or plain keys).
//! - Array append (`$append`, alias `$push`) and predicate removal (`$remove`,
//!   alias `$pull`).
//!
//! # Invariants
//! - Every applied update refreshes `updatedAt`.
//! - `id` and `createdAt` are never changed by an update.
//! - There is no increment primitive; counters are derived from arrays by
//!   callers.

use crate::model::document::{is_immutable_field, Document};
use crate::model::id::{ids_equal, is_identifier_field};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error raised while parsing or applying modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The update root or an operator body is not a JSON object.
    NotAnObject(String),
    /// `$`-prefixed key this engine does not implement.
    UnknownOperator(String),
    /// Append target exists but is not an array.
    NotAnArray(String),
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(context) => write!(f, "update {context} must be a JSON object"),
            Self::UnknownOperator(operator) => write!(f, "unknown update operator `{operator}`"),
            Self::NotAnArray(field) => write!(f, "cannot append to non-array field `{field}`"),
        }
    }
}

impl Error for UpdateError {}

/// Ordered set of modifications for one or many documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers {
    set: Map<String, Value>,
    append: Vec<(String, Value)>,
    remove: Vec<(String, Value)>,
}

impl Modifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modifiers that only shallow-merge `patch`.
    pub fn from_patch(patch: Map<String, Value>) -> Self {
        Self {
            set: patch,
            ..Self::default()
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    pub fn append(mut self, field: impl Into<String>, value: Value) -> Self {
        self.append.push((field.into(), value));
        self
    }

    /// Removes array elements equal to `pattern`, or, for object elements,
    /// matching every key/value of an object `pattern`.
    pub fn remove(mut self, field: impl Into<String>, pattern: Value) -> Self {
        self.remove.push((field.into(), pattern));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.append.is_empty() && self.remove.is_empty()
    }

    /// Parses a JSON update document.
    ///
    /// Plain keys and `$set` merge; `$append`/`$push` append; `$remove`/`$pull`
    /// remove. Any other `$` key is rejected.
    pub fn from_json(value: &Value) -> Result<Self, UpdateError> {
        let Value::Object(map) = value else {
            return Err(UpdateError::NotAnObject("document".to_string()));
        };

        let mut modifiers = Self::new();
        for (key, body) in map {
            if !key.starts_with('$') {
                modifiers.set.insert(key.clone(), body.clone());
                continue;
            }
            let fields = body
                .as_object()
                .ok_or_else(|| UpdateError::NotAnObject(format!("operator `{key}`")))?;
            match key.as_str() {
                "$set" => {
                    for (field, value) in fields {
                        modifiers.set.insert(field.clone(), value.clone());
                    }
                }
                "$append" | "$push" => {
                    for (field, value) in fields {
                        modifiers.append.push((field.clone(), value.clone()));
                    }
                }
                "$remove" | "$pull" => {
                    for (field, value) in fields {
                        modifiers.remove.push((field.clone(), value.clone()));
                    }
                }
                other => return Err(UpdateError::UnknownOperator(other.to_string())),
            }
        }
        Ok(modifiers)
    }

    /// Applies all modifiers to `doc` and stamps `updatedAt = now`.
    ///
    /// On error `doc` may be partially modified; callers discard it.
    pub fn apply(&self, doc: &mut Document, now: &str) -> Result<(), UpdateError> {
        doc.merge(&self.set);

        for (field, value) in &self.append {
            if is_immutable_field(field) {
                continue;
            }
            if matches!(doc.get(field), None | Some(Value::Null)) {
                doc.set(field.clone(), Value::Array(vec![value.clone()]));
                continue;
            }
            match doc.get_mut(field) {
                Some(Value::Array(items)) => items.push(value.clone()),
                _ => return Err(UpdateError::NotAnArray(field.clone())),
            }
        }

        for (field, pattern) in &self.remove {
            if let Some(Value::Array(items)) = doc.get_mut(field) {
                items.retain(|item| !element_matches(field, item, pattern));
            }
        }

        doc.touch(now);
        Ok(())
    }
}

/// Whether one array element is selected by a `$remove` pattern.
pub fn element_matches(field: &str, element: &Value, pattern: &Value) -> bool {
    match (element, pattern) {
        (Value::Object(item), Value::Object(partial)) if !partial.contains_key("$oid") => {
            partial.iter().all(|(key, wanted)| {
                item.get(key)
                    .is_some_and(|actual| loose_equals(key, actual, wanted))
            })
        }
        (_, Value::Object(partial)) if !partial.contains_key("$oid") => false,
        (item, scalar) => loose_equals(field, item, scalar),
    }
}

fn loose_equals(field: &str, actual: &Value, wanted: &Value) -> bool {
    if actual == wanted {
        return true;
    }
    (is_identifier_field(field) || (is_scalar_id(actual) && is_scalar_id(wanted)))
        && ids_equal(actual, wanted)
}

fn is_scalar_id(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_)) || value.get("$oid").is_some()
}

#[cfg(test)]
mod tests {
    use super::{Modifiers, UpdateError};
    use crate::model::document::Document;
    use serde_json::json;

    const NOW: &str = "2026-02-01T00:00:00.000Z";

    fn system() -> Document {
        Document::try_from(json!({
            "id": "s1",
            "createdAt": "2026-01-01T00:00:00.000Z",
            "tags": "prod",
            "licenseRequirements": [
                {"licenseType": "Office", "quantity": 1, "licenseId": "l1"},
                {"licenseType": "Office", "quantity": 1, "licenseId": "l2"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn remove_by_partial_object_uses_id_equality() {
        let mut doc = system();
        Modifiers::new()
            .remove("licenseRequirements", json!({"licenseId": {"$oid": "l1"}}))
            .apply(&mut doc, NOW)
            .unwrap();

        let remaining = doc.get("licenseRequirements").unwrap().as_array().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["licenseId"], json!("l2"));
        assert_eq!(doc.updated_at(), Some(NOW));
    }

    #[test]
    fn append_creates_missing_array_and_rejects_scalars() {
        let mut doc = system();
        Modifiers::new()
            .append("assignedUsers", json!("u1"))
            .apply(&mut doc, NOW)
            .unwrap();
        assert_eq!(doc.get("assignedUsers"), Some(&json!(["u1"])));

        let err = Modifiers::new()
            .append("tags", json!("x"))
            .apply(&mut doc, NOW)
            .unwrap_err();
        assert_eq!(err, UpdateError::NotAnArray("tags".to_string()));
    }

    #[test]
    fn from_json_accepts_aliases_and_plain_keys() {
        let parsed = Modifiers::from_json(&json!({
            "name": "edge-01",
            "$push": {"assignedSystems": "s3"},
            "$pull": {"assignedSystems": "s1"}
        }))
        .unwrap();
        let expected = Modifiers::new()
            .set("name", json!("edge-01"))
            .append("assignedSystems", json!("s3"))
            .remove("assignedSystems", json!("s1"));
        assert_eq!(parsed, expected);

        let err = Modifiers::from_json(&json!({"$inc": {"seats": 1}})).unwrap_err();
        assert_eq!(err, UpdateError::UnknownOperator("$inc".to_string()));
    }

    #[test]
    fn set_never_touches_identity() {
        let mut doc = system();
        Modifiers::new()
            .set("id", json!("hijack"))
            .set("name", json!("edge-01"))
            .apply(&mut doc, NOW)
            .unwrap();
        assert_eq!(doc.get("id"), Some(&json!("s1")));
        assert_eq!(doc.get("name"), Some(&json!("edge-01")));
    }
}
