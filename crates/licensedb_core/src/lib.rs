//! Core of licensedb: an embedded document store for License and System
//! records, with License<->System relationship synchronization.
//! This crate is the single source of truth for storage and sync invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod service;
pub mod store;
pub mod sync;
pub mod update;

pub use config::{BackendKind, ConfigError, StoreConfig};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::document::{Document, DocumentError};
pub use model::id::{generate_id, ids_equal, normalize as normalize_id, RecordId};
pub use query::{Filter, FilterError};
pub use service::license_service::LicenseService;
pub use service::relationship_service::RelationshipService;
pub use service::system_service::SystemService;
pub use service::{ServiceError, ServiceResult};
pub use store::{Backend, Collection, Database, StoreError, StoreResult};
pub use sync::{RepairReport, SymmetryViolation, SyncOutcome};
pub use update::{Modifiers, UpdateError};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
