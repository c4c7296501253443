//! Filter evaluation against in-memory documents.
//!
//! # Invariants
//! - Evaluation is total: no input makes it panic or error.
//! - Identifier fields always compare via `ids_equal`; regex and range
//!   predicates see their normalized string form.
//! - String equality and regex matching are case-sensitive unless the regex
//!   was built with an explicit case-insensitive option.

use crate::model::document::Document;
use crate::model::id::{ids_equal, is_identifier_field, normalize};
use crate::query::filter::{parse_date, Condition, Filter, Predicate, RangeOp};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Returns whether `doc` satisfies every condition of `filter`.
pub fn matches(doc: &Document, filter: &Filter) -> bool {
    filter
        .conditions()
        .iter()
        .all(|condition| condition_matches(doc, condition))
}

fn condition_matches(doc: &Document, condition: &Condition) -> bool {
    let field = condition.field.as_str();
    let stored = doc.get(field);
    match &condition.predicate {
        Predicate::Eq(expected) => field_equals(field, stored, expected),
        Predicate::AnyOf(candidates) => candidates
            .iter()
            .any(|candidate| field_equals(field, stored, candidate)),
        Predicate::Regex(regex) => match stored {
            Some(value) if is_identifier_field(field) => {
                id_texts(value).iter().any(|text| regex.is_match(text))
            }
            _ => stored
                .and_then(Value::as_str)
                .is_some_and(|text| regex.is_match(text)),
        },
        Predicate::Range(op, bound) => stored
            .and_then(|value| stored_date(field, value))
            .is_some_and(|value| match op {
                RangeOp::Lt => value < *bound,
                RangeOp::Lte => value <= *bound,
                RangeOp::Gt => value > *bound,
                RangeOp::Gte => value >= *bound,
            }),
        Predicate::Unsupported(_) => false,
    }
}

fn id_texts(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items.iter().map(normalize).collect(),
        other => vec![normalize(other)],
    };
    items.into_iter().filter(|text| !text.is_empty()).collect()
}

fn stored_date(field: &str, value: &Value) -> Option<DateTime<Utc>> {
    if is_identifier_field(field) {
        parse_date(&Value::String(normalize(value)))
    } else {
        parse_date(value)
    }
}

/// Equality between a stored field value and a filter value.
///
/// - identifier fields: `ids_equal`, element-wise when stored as an array
/// - stored array vs scalar: any element ID-equal
/// - stored array vs array: at least one ID-equal pair
/// - otherwise strict JSON equality; a missing field equals only `null`
pub fn field_equals(field: &str, stored: Option<&Value>, expected: &Value) -> bool {
    let Some(stored) = stored else {
        return expected.is_null();
    };

    match (stored, expected) {
        (Value::Array(items), Value::Array(wanted)) => items
            .iter()
            .any(|item| wanted.iter().any(|candidate| ids_equal(item, candidate))),
        (Value::Array(items), scalar) => items.iter().any(|item| ids_equal(item, scalar)),
        (scalar, wanted) if is_identifier_field(field) => ids_equal(scalar, wanted),
        (scalar, wanted) => scalar == wanted,
    }
}

#[cfg(test)]
mod tests {
    use super::{field_equals, matches};
    use crate::model::document::Document;
    use crate::query::filter::{Filter, RangeOp};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn license() -> Document {
        Document::try_from(json!({
            "id": "l1",
            "vendor": "Microsoft",
            "ownerId": {"$oid": "u7"},
            "assignedSystems": ["s1", "s2"],
            "expiry": "2026-06-30"
        }))
        .unwrap()
    }

    #[test]
    fn regex_is_case_sensitive_and_equality_is_exact() {
        let doc = license();
        assert!(matches(&doc, &Filter::new().regex("vendor", "Micro").unwrap()));
        assert!(!matches(&doc, &Filter::new().regex("vendor", "micro").unwrap()));
        assert!(!matches(&doc, &Filter::new().eq("vendor", json!("microsoft"))));
        assert!(matches(&doc, &Filter::new().eq("vendor", json!("Microsoft"))));
    }

    #[test]
    fn explicit_case_insensitive_option_is_honored() {
        let filter =
            Filter::from_json(&json!({"vendor": {"$regex": "micro", "$options": "i"}})).unwrap();
        assert!(matches(&license(), &filter));
    }

    #[test]
    fn identifier_fields_tolerate_representation() {
        let doc = license();
        assert!(matches(&doc, &Filter::new().eq("ownerId", json!("u7"))));
        assert!(matches(&doc, &Filter::new().eq("id", json!({"$oid": "l1"}))));
    }

    #[test]
    fn regex_and_range_on_identifier_fields_use_normalized_ids() {
        let doc = license();
        assert!(matches(&doc, &Filter::new().regex("ownerId", "^u7$").unwrap()));
        assert!(!matches(&doc, &Filter::new().regex("ownerId", "oid").unwrap()));

        let stamped = Document::try_from(json!({"batchId": {"$oid": "2026-01-15"}})).unwrap();
        let bound = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        assert!(matches(&stamped, &Filter::new().range("batchId", RangeOp::Lt, bound)));
    }

    #[test]
    fn array_membership_and_intersection() {
        let doc = license();
        assert!(matches(&doc, &Filter::new().eq("assignedSystems", json!("s2"))));
        assert!(matches(
            &doc,
            &Filter::new().eq("assignedSystems", json!(["s9", "s1"]))
        ));
        assert!(!matches(
            &doc,
            &Filter::new().eq("assignedSystems", json!(["s9"]))
        ));
        assert!(matches(
            &doc,
            &Filter::new().any_of("vendor", vec![json!("Adobe"), json!("Microsoft")])
        ));
    }

    #[test]
    fn range_compares_dates_and_skips_unparseable_values() {
        let doc = license();
        let bound = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        assert!(matches(&doc, &Filter::new().range("expiry", RangeOp::Lt, bound)));
        assert!(!matches(&doc, &Filter::new().range("expiry", RangeOp::Gte, bound)));
        assert!(!matches(&doc, &Filter::new().range("vendor", RangeOp::Lt, bound)));
    }

    #[test]
    fn unsupported_operator_never_matches() {
        let filter = Filter::from_json(&json!({"vendor": {"$where": "1"}})).unwrap();
        assert!(!matches(&license(), &filter));
    }

    #[test]
    fn missing_field_equals_only_null() {
        assert!(field_equals("notes", None, &json!(null)));
        assert!(!field_equals("notes", None, &json!("")));
    }
}
