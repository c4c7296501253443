//! Record model shared by every backend.
//!
//! # Responsibility
//! - Define the schema-agnostic `Document` and its opaque `RecordId`.
//! - Name the License/System conventions the synchronizer relies on.
//!
//! # Invariants
//! - Documents are owned by exactly one collection; cross-references are by
//!   id value only.

pub mod document;
pub mod id;
pub mod relation;
