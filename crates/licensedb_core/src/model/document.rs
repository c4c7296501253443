//! Schema-agnostic document record.
//!
//! # Responsibility
//! - Wrap an open field map with typed access to reserved fields.
//! - Own timestamp formatting for `createdAt`/`updatedAt`.
//!
//! # Invariants
//! - A stored document always carries `id`, `createdAt` and `updatedAt`.
//! - Patches never overwrite `id` or `createdAt`.

use crate::model::id::RecordId;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// Error raised when a JSON value cannot be used as a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Documents must be JSON objects.
    NotAnObject(&'static str),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(kind) => write!(f, "document must be a JSON object, got {kind}"),
        }
    }
}

impl Error for DocumentError {}

/// One record: an open mapping of field name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the normalized record id, if present.
    pub fn id(&self) -> Option<RecordId> {
        self.0.get(FIELD_ID).and_then(RecordId::from_value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Builder-style variant of [`Document::set`].
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn created_at(&self) -> Option<&str> {
        self.0.get(FIELD_CREATED_AT).and_then(Value::as_str)
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.0.get(FIELD_UPDATED_AT).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Shallow-merges `patch` onto this document.
    ///
    /// `id` and `createdAt` keys in the patch are ignored.
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            if is_immutable_field(key) {
                continue;
            }
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Refreshes `updatedAt` to `now`.
    pub fn touch(&mut self, now: &str) {
        self.0
            .insert(FIELD_UPDATED_AT.to_string(), Value::String(now.to_string()));
    }

    /// Stamps identity and both timestamps for a first insert.
    pub(crate) fn stamp_new(&mut self, id: &RecordId, now: &str) {
        self.0.insert(FIELD_ID.to_string(), id.to_value());
        self.0
            .insert(FIELD_CREATED_AT.to_string(), Value::String(now.to_string()));
        self.touch(now);
    }
}

impl From<Map<String, Value>> for Document {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(DocumentError::NotAnObject("null")),
            Value::Bool(_) => Err(DocumentError::NotAnObject("bool")),
            Value::Number(_) => Err(DocumentError::NotAnObject("number")),
            Value::String(_) => Err(DocumentError::NotAnObject("string")),
            Value::Array(_) => Err(DocumentError::NotAnObject("array")),
        }
    }
}

/// Returns whether a patch may never change `field`.
pub fn is_immutable_field(field: &str) -> bool {
    field == FIELD_ID || field == FIELD_CREATED_AT
}

/// Current UTC time in the stored timestamp format (RFC 3339, millis, `Z`).
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::{now_timestamp, Document, DocumentError};
    use crate::model::id::RecordId;
    use serde_json::json;

    #[test]
    fn merge_keeps_identity_and_creation_time() {
        let mut doc = Document::try_from(json!({
            "id": "l1",
            "createdAt": "2026-01-01T00:00:00.000Z",
            "vendor": "Microsoft"
        }))
        .unwrap();

        let patch = json!({"id": "other", "createdAt": "x", "vendor": "Adobe"});
        doc.merge(patch.as_object().unwrap());

        assert_eq!(doc.id(), Some(RecordId::from("l1")));
        assert_eq!(doc.created_at(), Some("2026-01-01T00:00:00.000Z"));
        assert_eq!(doc.get("vendor"), Some(&json!("Adobe")));
    }

    #[test]
    fn try_from_rejects_non_objects() {
        assert_eq!(
            Document::try_from(json!([1, 2])).unwrap_err(),
            DocumentError::NotAnObject("array")
        );
    }

    #[test]
    fn timestamps_are_utc_millis() {
        let stamp = now_timestamp();
        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.len(), "2026-01-02T03:04:05.678Z".len());
    }
}
