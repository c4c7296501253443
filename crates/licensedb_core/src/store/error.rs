//! Store error taxonomy.
//!
//! # Invariants
//! - "Not found" is never an error; lookups return `Option`/`bool`.
//! - Corrupt persisted data is always reported, never read as empty.

use crate::config::ConfigError;
use crate::db::DbError;
use crate::model::document::DocumentError;
use crate::model::id::RecordId;
use crate::query::FilterError;
use crate::store::schema::SchemaViolation;
use crate::update::UpdateError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Error surfaced by collection and backend operations.
#[derive(Debug)]
pub enum StoreError {
    /// Backing data exists but cannot be read.
    Io { location: String, message: String },
    /// Backing data exists but is not a valid collection.
    Corruption { location: String, message: String },
    /// Persisting a collection failed (disk full, permissions, ...).
    WriteFailure { location: String, message: String },
    /// Another writer committed between load and commit.
    Conflict {
        collection: String,
        expected: u64,
        found: u64,
    },
    /// Cross-process collection lock stayed held past the timeout.
    LockBusy { lock_path: String },
    /// A caller-supplied id already exists in the collection.
    DuplicateId { collection: String, id: RecordId },
    /// Collection name is not usable as a storage key.
    InvalidCollectionName(String),
    /// Transaction body asked for a collection it did not open.
    CollectionNotOpened(String),
    /// Schema-validated backend rejected a document.
    Validation(SchemaViolation),
    Filter(FilterError),
    Update(UpdateError),
    Document(DocumentError),
    Db(DbError),
    Config(ConfigError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { location, message } => write!(f, "failed to read `{location}`: {message}"),
            Self::Corruption { location, message } => {
                write!(f, "corrupt collection data in `{location}`: {message}")
            }
            Self::WriteFailure { location, message } => {
                write!(f, "failed to write `{location}`: {message}")
            }
            Self::Conflict {
                collection,
                expected,
                found,
            } => write!(
                f,
                "concurrent write detected on `{collection}`: expected revision {expected}, found {found}"
            ),
            Self::LockBusy { lock_path } => write!(f, "collection lock busy: {lock_path}"),
            Self::DuplicateId { collection, id } => {
                write!(f, "document id `{id}` already exists in `{collection}`")
            }
            Self::InvalidCollectionName(name) => write!(f, "invalid collection name `{name}`"),
            Self::CollectionNotOpened(name) => {
                write!(f, "collection `{name}` is not part of this transaction")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Filter(err) => write!(f, "{err}"),
            Self::Update(err) => write!(f, "{err}"),
            Self::Document(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Filter(err) => Some(err),
            Self::Update(err) => Some(err),
            Self::Document(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<FilterError> for StoreError {
    fn from(value: FilterError) -> Self {
        Self::Filter(value)
    }
}

impl From<UpdateError> for StoreError {
    fn from(value: UpdateError) -> Self {
        Self::Update(value)
    }
}

impl From<DocumentError> for StoreError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<SchemaViolation> for StoreError {
    fn from(value: SchemaViolation) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
