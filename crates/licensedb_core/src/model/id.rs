//! Record identifiers and ID-aware comparison.
//!
//! # Responsibility
//! - Generate opaque record identifiers.
//! - Normalize heterogeneous identifier representations to one string form.
//!
//! # Invariants
//! - Generated IDs carry 128 bits of randomness.
//! - Absent identifiers (`null`, empty string) never compare equal, not even
//!   to each other.
//! - `normalize` is total and never panics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque identifier of one document within its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Builds an id from any identifier-like JSON value.
    ///
    /// Returns `None` when the value normalizes to an empty string.
    pub fn from_value(value: &Value) -> Option<Self> {
        let normalized = normalize(value);
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// JSON form used when the id is written into a document.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

    /// ID-aware comparison against an arbitrary stored value.
    pub fn matches(&self, value: &Value) -> bool {
        !self.0.is_empty() && normalize(value) == self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&RecordId> for Value {
    fn from(value: &RecordId) -> Self {
        value.to_value()
    }
}

/// Generates a new random record id (UUID v4, simple hex form).
pub fn generate_id() -> RecordId {
    RecordId(Uuid::new_v4().simple().to_string())
}

/// Converts any identifier representation to its canonical string.
///
/// - `null` -> `""`
/// - strings pass through unchanged
/// - numbers/booleans use their textual form
/// - objects exposing a string conversion (`{"$oid": ..}`, `{"id": ..}`,
///   `{"_id": ..}`) use that string
/// - anything else falls back to compact JSON text
pub fn normalize(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Object(map) => ["$oid", "_id", "id"]
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(Value::String(text)) => Some(text.clone()),
                Some(nested @ Value::Object(_)) => Some(normalize(nested)),
                _ => None,
            })
            .unwrap_or_else(|| value.to_string()),
        Value::Array(_) => value.to_string(),
    }
}

/// Returns whether two identifier values denote the same record.
pub fn ids_equal(a: &Value, b: &Value) -> bool {
    let left = normalize(a);
    !left.is_empty() && left == normalize(b)
}

/// Returns whether `field` holds identifiers and must use [`ids_equal`].
pub fn is_identifier_field(field: &str) -> bool {
    matches!(field, "id" | "_id" | "ownerId" | "managerId")
        || field.ends_with("Id")
        || field.ends_with("_id")
}
