//! Query engine: typed filters and their evaluation.
//!
//! # Responsibility
//! - Express filters as explicit predicates (`Eq | Regex | Range | AnyOf`).
//! - Evaluate them against documents with ID-aware equality.
//!
//! # Invariants
//! - Queries are total functions; unknown operators simply do not match.

pub mod filter;
pub mod matcher;

pub use filter::{parse_date, Condition, Filter, FilterError, Predicate, RangeOp};
pub use matcher::{field_equals, matches};
