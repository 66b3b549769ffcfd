//! Error taxonomy for revstore
//!
//! Every backend reports failures through [`StoreError`]. Callers that only
//! care about the category match on [`StoreError::kind`].
//!
//! `VersionConflict` is routine: the caller re-reads the latest revision and
//! tries again. Everything else is exceptional.

use crate::entity::Version;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// No version record exists for the id
    #[error("entity not found: {id}")]
    EntityNotFound {
        /// The requested entity id
        id: String,
    },

    /// The id exists but has no revision at the requested version
    #[error("version {version} of entity {id} not found")]
    VersionNotFound {
        /// The requested entity id
        id: String,
        /// The requested version
        version: Version,
    },

    /// `add` was called for an id that already has a version record
    #[error("entity already exists: {id}")]
    EntityAlreadyExists {
        /// The duplicate entity id
        id: String,
    },

    /// Optimistic append presented a stale version
    #[error("version conflict on {id}: presented {expected}, stored {actual}")]
    VersionConflict {
        /// The entity id
        id: String,
        /// Version the caller presented
        expected: Version,
        /// Version currently stored
        actual: Version,
    },

    /// Payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend failure not classified above
    #[error("internal error during {operation} on {id}: {message}")]
    Internal {
        /// Store operation that failed
        operation: &'static str,
        /// Entity id the operation targeted (empty for store-wide operations)
        id: String,
        /// Backend detail
        message: String,
    },

    /// The version record points past a revision that was never written
    ///
    /// Raised by readers when the version was advanced but the revision
    /// write failed (or is still in flight).
    #[error("revision {version} of entity {id} is missing (incomplete write)")]
    IncompleteWrite {
        /// The entity id
        id: String,
        /// The version without a revision
        version: Version,
    },

    /// Missing or invalid configuration
    #[error("configuration error for '{key}': {reason}")]
    Config {
        /// Configuration key
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// Backend could not be initialized
    #[error("init failed: {0}")]
    Init(String),

    /// A data operation was called before `init`
    #[error("store not initialized")]
    NotInitialized,

    /// The entity cannot be stored as given
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// Lost the CAS race on every permitted attempt
    #[error("retries exhausted on {id} after {attempts} attempts")]
    RetryExhausted {
        /// The entity id
        id: String,
        /// Attempts made
        attempts: u32,
    },

    /// The retry deadline elapsed before the CAS succeeded
    #[error("timed out on {id} after {attempts} attempts ({elapsed:?})")]
    Timeout {
        /// The entity id
        id: String,
        /// Attempts made
        attempts: u32,
        /// Time spent in the protocol
        elapsed: Duration,
    },
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Id or (id, version) has no record
    EntityNotFound,
    /// Duplicate `add`
    EntityAlreadyExists,
    /// Stale optimistic append
    VersionConflict,
    /// Encode or decode failure
    SerializationFailed,
    /// Unclassified backend failure
    InternalError,
    /// Version advanced without its revision
    IncompleteWrite,
    /// Configuration or initialization failure
    InitError,
    /// Caller supplied an unusable entity
    InvalidEntity,
    /// Retry budget spent
    RetryExhausted,
    /// Retry deadline elapsed
    Timeout,
}

impl StoreError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::EntityNotFound { .. } | StoreError::VersionNotFound { .. } => {
                ErrorKind::EntityNotFound
            }
            StoreError::EntityAlreadyExists { .. } => ErrorKind::EntityAlreadyExists,
            StoreError::VersionConflict { .. } => ErrorKind::VersionConflict,
            StoreError::Serialization(_) => ErrorKind::SerializationFailed,
            StoreError::Internal { .. } => ErrorKind::InternalError,
            StoreError::IncompleteWrite { .. } => ErrorKind::IncompleteWrite,
            StoreError::Config { .. } | StoreError::Init(_) | StoreError::NotInitialized => {
                ErrorKind::InitError
            }
            StoreError::InvalidEntity(_) => ErrorKind::InvalidEntity,
            StoreError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            StoreError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Check if this is a version conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    /// Check if this is a not-found error (entity or version)
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::EntityNotFound
    }

    /// Check if this error is retryable.
    ///
    /// Only a version conflict is: the caller re-reads the latest revision and
    /// tries again. An exhausted or timed-out race already spent the store's
    /// own retry budget.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }

    /// Build an internal error with operation and id context
    pub fn internal(operation: &'static str, id: &str, message: impl std::fmt::Display) -> Self {
        StoreError::Internal {
            operation,
            id: id.to_string(),
            message: message.to_string(),
        }
    }

    /// Build a configuration error
    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        StoreError::Config {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
