//! Document schemas enforced by the schema-validated backend.
//!
//! # Responsibility
//! - Declare required/typed fields per collection.
//! - Reject documents that do not fit before they are persisted.
//!
//! # Invariants
//! - Reserved fields (`id`, `createdAt`, `updatedAt`) are always required
//!   strings, whether or not a schema is registered.
//! - Optional typed fields accept `null`.

use crate::model::document::{Document, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT};
use crate::model::relation::{ASSIGNED_SYSTEMS, LICENSES, LICENSE_REQUIREMENTS, SYSTEMS};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// JSON shape expected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Array,
    Object,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Rejected document details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub collection: String,
    pub field: String,
    pub problem: String,
}

impl Display for SchemaViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "document rejected by `{}` schema: field `{}` {}",
            self.collection, self.field, self.problem
        )
    }
}

impl Error for SchemaViolation {}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRule {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// Field rules for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSchema {
    rules: Vec<FieldRule>,
}

impl CollectionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.rules.push(FieldRule {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.rules.push(FieldRule {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn validate(&self, collection: &str, doc: &Document) -> Result<(), SchemaViolation> {
        for reserved in [FIELD_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT] {
            check_field(collection, doc, reserved, FieldKind::String, true)?;
        }
        for rule in &self.rules {
            check_field(collection, doc, &rule.name, rule.kind, rule.required)?;
        }
        Ok(())
    }
}

fn check_field(
    collection: &str,
    doc: &Document,
    field: &str,
    kind: FieldKind,
    required: bool,
) -> Result<(), SchemaViolation> {
    let violation = |problem: String| SchemaViolation {
        collection: collection.to_string(),
        field: field.to_string(),
        problem,
    };
    match doc.get(field) {
        None | Some(Value::Null) if required => Err(violation("is required".to_string())),
        None | Some(Value::Null) => Ok(()),
        Some(value) if kind.accepts(value) => Ok(()),
        Some(_) => Err(violation(format!("must be {}", kind.as_str()))),
    }
}

/// Schemas keyed by collection name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, CollectionSchema>,
}

impl SchemaRegistry {
    /// Registry without any collection-specific rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rules for the License/System assignment fields.
    pub fn defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(
            LICENSES,
            CollectionSchema::new().optional(ASSIGNED_SYSTEMS, FieldKind::Array),
        );
        registry.register(
            SYSTEMS,
            CollectionSchema::new().optional(LICENSE_REQUIREMENTS, FieldKind::Array),
        );
        registry
    }

    pub fn register(&mut self, collection: impl Into<String>, schema: CollectionSchema) {
        self.schemas.insert(collection.into(), schema);
    }

    pub fn validate(&self, collection: &str, doc: &Document) -> Result<(), SchemaViolation> {
        match self.schemas.get(collection) {
            Some(schema) => schema.validate(collection, doc),
            None => CollectionSchema::new().validate(collection, doc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CollectionSchema, FieldKind, SchemaRegistry};
    use crate::model::document::Document;
    use serde_json::json;

    fn stamped(extra: serde_json::Value) -> Document {
        let mut doc = Document::try_from(extra).unwrap();
        doc.set("id", json!("x1"));
        doc.set("createdAt", json!("2026-01-01T00:00:00.000Z"));
        doc.set("updatedAt", json!("2026-01-01T00:00:00.000Z"));
        doc
    }

    #[test]
    fn defaults_reject_scalar_assignment_fields() {
        let registry = SchemaRegistry::defaults();
        let bad = stamped(json!({"assignedSystems": "s1"}));
        let err = registry.validate("licenses", &bad).unwrap_err();
        assert_eq!(err.field, "assignedSystems");

        let ok = stamped(json!({"assignedSystems": ["s1"]}));
        assert!(registry.validate("licenses", &ok).is_ok());
    }

    #[test]
    fn reserved_fields_are_always_required() {
        let registry = SchemaRegistry::empty();
        let err = registry
            .validate("vendors", &Document::try_from(json!({"name": "x"})).unwrap())
            .unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn custom_required_field() {
        let schema = CollectionSchema::new().required("name", FieldKind::String);
        let err = schema.validate("vendors", &stamped(json!({}))).unwrap_err();
        assert_eq!(err.problem, "is required");
        assert!(schema
            .validate("vendors", &stamped(json!({"name": "Adobe"})))
            .is_ok());
    }
}
