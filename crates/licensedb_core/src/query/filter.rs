//! Typed filter expressions and their JSON parser.
//!
//! # Responsibility
//! - Represent filters as explicit predicates instead of operator-suffixed keys.
//! - Parse collaborator-supplied JSON filters, including legacy `field.$op` keys.
//!
//! # Invariants
//! - Invalid regex patterns and unparseable range bounds fail at build time.
//! - Unknown operators parse to `Predicate::Unsupported`, which never matches.

use crate::model::document::FIELD_ID;
use crate::model::id::RecordId;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error raised while building a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The filter root is not a JSON object.
    NotAnObject,
    /// Regex pattern failed to compile.
    InvalidRegex { field: String, message: String },
    /// Range bound is not a recognizable date.
    InvalidDate { field: String, value: String },
    /// Operator argument has the wrong JSON shape.
    InvalidOperand { field: String, operator: String },
}

impl Display for FilterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "filter must be a JSON object"),
            Self::InvalidRegex { field, message } => {
                write!(f, "invalid regex for field `{field}`: {message}")
            }
            Self::InvalidDate { field, value } => {
                write!(f, "invalid date bound `{value}` for field `{field}`")
            }
            Self::InvalidOperand { field, operator } => {
                write!(f, "invalid operand for `{operator}` on field `{field}`")
            }
        }
    }
}

impl Error for FilterError {}

/// Date comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    fn from_operator(operator: &str) -> Option<Self> {
        match operator {
            "$lt" => Some(Self::Lt),
            "$lte" => Some(Self::Lte),
            "$gt" => Some(Self::Gt),
            "$gte" => Some(Self::Gte),
            _ => None,
        }
    }
}

/// Condition applied to one field.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Equality with ID-aware and array-aware semantics.
    Eq(Value),
    /// Pattern match against a string field.
    Regex(Regex),
    /// Field parsed as a date, compared with the bound.
    Range(RangeOp, DateTime<Utc>),
    /// Field (or any element) equals one of the values.
    AnyOf(Vec<Value>),
    /// Operator this engine does not know; never matches.
    Unsupported(String),
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Eq(a), Self::Eq(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            (Self::Range(op_a, a), Self::Range(op_b, b)) => op_a == op_b && a == b,
            (Self::AnyOf(a), Self::AnyOf(b)) => a == b,
            (Self::Unsupported(a), Self::Unsupported(b)) => a == b,
            _ => false,
        }
    }
}

/// One field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub predicate: Predicate,
}

/// Conjunction of field conditions. Empty matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter selecting the record with `id`.
    pub fn by_id(id: &RecordId) -> Self {
        Self::new().eq(FIELD_ID, id.to_value())
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            predicate,
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: Value) -> Self {
        self.with(field, Predicate::Eq(value))
    }

    /// Adds a case-sensitive pattern condition.
    pub fn regex(self, field: impl Into<String>, pattern: &str) -> Result<Self, FilterError> {
        let field = field.into();
        let compiled = compile_regex(&field, pattern, "")?;
        Ok(self.with(field, Predicate::Regex(compiled)))
    }

    pub fn range(self, field: impl Into<String>, op: RangeOp, bound: DateTime<Utc>) -> Self {
        self.with(field, Predicate::Range(op, bound))
    }

    pub fn any_of(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, Predicate::AnyOf(values))
    }

    /// Parses a JSON filter object.
    ///
    /// Accepted forms per key:
    /// - `{"field": literal}`
    /// - `{"field": {"$regex": "p", "$options": "i"}}`
    /// - `{"field": {"$lt" | "$lte" | "$gt" | "$gte": date}}`
    /// - `{"field": {"$in": [..]}}`
    /// - legacy `{"field.$op": operand}`
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let Value::Object(map) = value else {
            return Err(FilterError::NotAnObject);
        };

        let mut filter = Self::new();
        for (key, operand) in map {
            if let Some((field, operator)) = split_legacy_key(key) {
                let mut single = Map::new();
                single.insert(operator.to_string(), operand.clone());
                filter.push_operators(field, &single)?;
                continue;
            }

            match operand {
                Value::Object(ops) if is_operator_object(ops) => {
                    filter.push_operators(key, ops)?;
                }
                literal => {
                    filter = filter.eq(key.as_str(), literal.clone());
                }
            }
        }
        Ok(filter)
    }

    fn push_operators(&mut self, field: &str, ops: &Map<String, Value>) -> Result<(), FilterError> {
        let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
        for (operator, operand) in ops {
            let predicate = match operator.as_str() {
                "$options" => continue,
                "$eq" => Predicate::Eq(operand.clone()),
                "$regex" => {
                    let pattern = operand.as_str().ok_or_else(|| invalid(field, operator))?;
                    Predicate::Regex(compile_regex(field, pattern, options)?)
                }
                "$in" => {
                    let values = operand.as_array().ok_or_else(|| invalid(field, operator))?;
                    Predicate::AnyOf(values.clone())
                }
                other => match RangeOp::from_operator(other) {
                    Some(op) => {
                        let bound = parse_date(operand).ok_or_else(|| FilterError::InvalidDate {
                            field: field.to_string(),
                            value: operand.to_string(),
                        })?;
                        Predicate::Range(op, bound)
                    }
                    None => Predicate::Unsupported(other.to_string()),
                },
            };
            self.conditions.push(Condition {
                field: field.to_string(),
                predicate,
            });
        }
        Ok(())
    }
}

fn invalid(field: &str, operator: &str) -> FilterError {
    FilterError::InvalidOperand {
        field: field.to_string(),
        operator: operator.to_string(),
    }
}

// `{"$oid": ..}` is an identifier literal, not an operator object.
fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && !map.contains_key("$oid")
        && map.keys().all(|key| key.starts_with('$'))
}

fn split_legacy_key(key: &str) -> Option<(&str, &str)> {
    let (field, operator) = key.rsplit_once('.')?;
    if field.is_empty() || !operator.starts_with('$') {
        return None;
    }
    Some((field, operator))
}

fn compile_regex(field: &str, pattern: &str, options: &str) -> Result<Regex, FilterError> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|err| FilterError::InvalidRegex {
            field: field.to_string(),
            message: err.to_string(),
        })
}

/// Parses a stored or supplied value as a UTC instant.
///
/// Accepts RFC 3339 strings, `YYYY-MM-DD` dates (midnight UTC) and epoch
/// milliseconds.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                return Some(parsed.with_timezone(&Utc));
            }
            let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()?;
            Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
        }
        Value::Number(number) => Utc.timestamp_millis_opt(number.as_i64()?).single(),
        _ => None,
    }
}
