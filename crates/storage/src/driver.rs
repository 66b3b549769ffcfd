//! Types shared by the service drivers
//!
//! Both remote services identify a record revision with an opaque ETag that
//! changes on every write. Conditional writes carry the ETag the caller last
//! saw and are rejected with [`DriverError::PreconditionFailed`] when it no
//! longer matches.

use revstore_concurrency::VersionRead;
use revstore_core::{StoreError, Version, FIRST_VERSION};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque optimistic-write token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    /// Wrap a token received from a service
    pub fn new(tag: impl Into<String>) -> Self {
        ETag(tag.into())
    }

    /// Fresh random token
    pub fn generate() -> Self {
        ETag(format!("\"{}\"", Uuid::new_v4()))
    }

    /// Token text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors reported by a service driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Conditional write rejected: the record changed since it was read
    #[error("precondition failed: etag mismatch")]
    PreconditionFailed,

    /// Insert rejected: a record with the same key exists
    #[error("conflict: resource already exists")]
    Conflict,

    /// Target container, table or record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials rejected
    #[error("unauthorized")]
    Unauthorized,

    /// Service could not be reached or failed the request
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Service returned something this client cannot interpret
    #[error("malformed: {0}")]
    Malformed(String),
}

/// Result type for driver calls
pub type DriverResult<T> = std::result::Result<T, DriverError>;

impl DriverError {
    /// Wrap as a store error with operation and entity context
    pub fn into_store_error(self, operation: &'static str, id: &str) -> StoreError {
        match self {
            DriverError::Malformed(msg) => {
                StoreError::Serialization(format!("{} on {}: {}", operation, id, msg))
            }
            other => StoreError::internal(operation, id, other),
        }
    }

    /// Wrap a failure raised while initializing a backend
    pub fn into_init_error(self, what: &str) -> StoreError {
        StoreError::Init(format!("{}: {}", what, self))
    }
}

/// Classify a point read that found no revision
pub(crate) fn missing_revision<T>(
    id: &str,
    version: Version,
    record: Option<VersionRead<T>>,
) -> StoreError {
    match record {
        None => StoreError::EntityNotFound { id: id.to_string() },
        Some(read) if version >= FIRST_VERSION && version <= read.version => {
            StoreError::IncompleteWrite {
                id: id.to_string(),
                version,
            }
        }
        Some(_) => StoreError::VersionNotFound {
            id: id.to_string(),
            version,
        },
    }
}
