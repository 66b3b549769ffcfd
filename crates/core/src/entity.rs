//! The versioned entity record
//!
//! An [`Entity`] is one immutable revision of a caller-identified record.
//! The history of an id is the sequence of its revisions, numbered from
//! [`FIRST_VERSION`] with no gaps under correct operation.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};

/// Version number of a revision
///
/// Strictly increasing per entity id. Assigned by the store, never by the caller.
pub type Version = u64;

/// Version assigned to the first revision of every entity
pub const FIRST_VERSION: Version = 1;

/// A versioned revision of a domain record
///
/// The `version` field has two roles:
/// - on revisions returned by the store it is the version the revision was stored at
/// - on entities passed to an optimistic append it is the version the caller last read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable, caller-chosen identity
    pub id: String,
    /// Revision number
    pub version: Version,
    /// Opaque caller-defined metadata
    #[serde(default)]
    pub metadata: String,
    /// Opaque payload
    pub data: serde_json::Value,
}

impl Entity {
    /// Create an entity with empty metadata
    ///
    /// The version starts at 0; `add` assigns [`FIRST_VERSION`].
    pub fn new(id: impl Into<String>, data: impl Into<serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            metadata: String::new(),
            data: data.into(),
        }
    }

    /// Set the metadata string
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Set the version the caller last observed
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Reject entities no backend can key
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(StoreError::InvalidEntity(
                "entity id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Clone of this revision stamped with `version`
    pub fn at_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}
