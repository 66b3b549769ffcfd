//! The backend contract
//!
//! Every storage backend implements [`EventStore`]. The trait is synchronous
//! and object safe; implementations use interior mutability so a single
//! instance can be shared across threads behind an `Arc`.

use crate::concurrency::ConcurrencyMode;
use crate::config::{BackendKind, StoreConfig};
use crate::entity::{Entity, Version, FIRST_VERSION};
use crate::error::{Result, StoreError};

/// Versioned entity store
///
/// # Contract
///
/// - `add` creates the version record at [`FIRST_VERSION`] together with the
///   first revision, and fails with `EntityAlreadyExists` for a known id.
/// - `append` assigns `latest + 1` and stores the revision at that version.
///   Under [`ConcurrencyMode::Optimistic`] the entity's `version` must equal
///   the stored latest version, otherwise `VersionConflict`.
/// - Revisions are immutable once written.
/// - Data operations before `init` fail with `NotInitialized`.
pub trait EventStore: Send + Sync {
    /// Connect and ensure the physical containers exist. Idempotent.
    fn init(&self, config: &StoreConfig) -> Result<()>;

    /// Store the first revision of a new entity
    fn add(&self, entity: Entity) -> Result<Entity>;

    /// Store the next revision of an existing entity
    fn append(&self, entity: Entity, mode: ConcurrencyMode) -> Result<Entity>;

    /// Current latest version of an entity
    fn get_latest_version_number(&self, id: &str) -> Result<Version>;

    /// Revision at an exact version
    fn get_by_version(&self, id: &str, version: Version) -> Result<Entity>;

    /// Revisions with `start <= version <= end`, ascending
    ///
    /// An empty range yields an empty vector, not an error.
    fn get_by_version_range(&self, id: &str, start: Version, end: Version)
        -> Result<Vec<Entity>>;

    /// Which backend variant this is
    fn backend_kind(&self) -> BackendKind;

    /// Latest revision of an entity
    fn get_latest(&self, id: &str) -> Result<Entity> {
        let version = self.get_latest_version_number(id)?;
        self.get_by_version(id, version)
    }

    /// Highest version whose revision is actually readable
    ///
    /// Equal to `get_latest_version_number` unless a write advanced the
    /// version record and then failed to store its revision.
    fn latest_committed_version(&self, id: &str) -> Result<Version> {
        let mut version = self.get_latest_version_number(id)?;
        while version >= FIRST_VERSION {
            match self.get_by_version(id, version) {
                Ok(_) => return Ok(version),
                Err(StoreError::IncompleteWrite { .. }) => version -= 1,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::IncompleteWrite {
            id: id.to_string(),
            version: FIRST_VERSION,
        })
    }
}

/// Shared range-argument handling for backends
///
/// Returns `None` when the range cannot contain any revision.
pub fn normalize_range(start: Version, end: Version) -> Option<(Version, Version)> {
    let start = start.max(FIRST_VERSION);
    if start > end {
        None
    } else {
        Some((start, end))
    }
}
