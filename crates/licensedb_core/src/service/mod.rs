//! Core use-case services.
//!
//! # Responsibility
//! - Route License and System writes through one transaction that also runs
//!   relationship synchronization.
//! - Keep CLI and other callers decoupled from backend details.
//!
//! # Invariants
//! - Every License/System write opens both collections, so the triggering
//!   write and its back-reference updates commit together.
//! - "Not found" on update/delete is `Ok(None)` / `Ok(false)`, matching the
//!   collection surface.

use crate::model::id::RecordId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod license_service;
pub mod relationship_service;
pub mod system_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for License/System use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Storage-layer failure.
    Store(StoreError),
    /// A record required by a derived view does not exist.
    NotFound(RecordId),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
