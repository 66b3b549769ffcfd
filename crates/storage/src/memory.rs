//! In-memory backend
//!
//! All state lives in one map of version records and one map of revision
//! maps, guarded by a single mutex owned by the instance. Every operation,
//! reads included, holds the lock for its whole duration, so bump-and-write
//! is atomic and the version-assignment protocol never loses a race here.
//!
//! There is no externally shared state, so no conditional-write primitive is
//! needed: the error taxonomy maps onto plain existence and equality checks.

use parking_lot::Mutex;
use revstore_core::traits::normalize_range;
use revstore_core::{
    BackendKind, ConcurrencyMode, Entity, EventStore, Result, StoreConfig, StoreError, Version,
    FIRST_VERSION,
};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct MemoryState {
    /// Latest version per entity id
    versions: FxHashMap<String, Version>,
    /// Revisions per entity id, ordered by version
    revisions: FxHashMap<String, BTreeMap<Version, Entity>>,
}

/// Process-local store
///
/// Construct one instance per logical store; instances share nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// `None` until `init`
    state: Mutex<Option<MemoryState>>,
}

impl InMemoryStore {
    /// Create an uninitialized store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities added so far
    pub fn entity_count(&self) -> usize {
        self.state
            .lock()
            .as_ref()
            .map(|s| s.versions.len())
            .unwrap_or(0)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(StoreError::NotInitialized)?;
        f(state)
    }
}

impl EventStore for InMemoryStore {
    fn init(&self, _config: &StoreConfig) -> Result<()> {
        let mut guard = self.state.lock();
        if guard.is_none() {
            *guard = Some(MemoryState::default());
            tracing::info!(backend = "memory", "store initialized");
        }
        Ok(())
    }

    fn add(&self, entity: Entity) -> Result<Entity> {
        entity.validate()?;
        self.with_state(|state| {
            if state.versions.contains_key(&entity.id) {
                return Err(StoreError::EntityAlreadyExists { id: entity.id });
            }
            let revision = entity.at_version(FIRST_VERSION);
            state.versions.insert(revision.id.clone(), FIRST_VERSION);
            let mut revisions = BTreeMap::new();
            revisions.insert(FIRST_VERSION, revision.clone());
            state.revisions.insert(revision.id.clone(), revisions);
            Ok(revision)
        })
    }

    fn append(&self, entity: Entity, mode: ConcurrencyMode) -> Result<Entity> {
        entity.validate()?;
        self.with_state(|state| {
            let current = *state
                .versions
                .get(&entity.id)
                .ok_or_else(|| StoreError::EntityNotFound {
                    id: entity.id.clone(),
                })?;

            if mode.checks_version() && entity.version != current {
                return Err(StoreError::VersionConflict {
                    id: entity.id,
                    expected: entity.version,
                    actual: current,
                });
            }

            let next = current
                .checked_add(1)
                .ok_or_else(|| StoreError::internal("append", &entity.id, "version overflow"))?;
            let revision = entity.at_version(next);
            state.versions.insert(revision.id.clone(), next);
            state
                .revisions
                .entry(revision.id.clone())
                .or_default()
                .insert(next, revision.clone());
            Ok(revision)
        })
    }

    fn get_latest_version_number(&self, id: &str) -> Result<Version> {
        self.with_state(|state| {
            state
                .versions
                .get(id)
                .copied()
                .ok_or_else(|| StoreError::EntityNotFound { id: id.to_string() })
        })
    }

    fn get_by_version(&self, id: &str, version: Version) -> Result<Entity> {
        self.with_state(|state| {
            let revisions = state
                .revisions
                .get(id)
                .ok_or_else(|| StoreError::EntityNotFound { id: id.to_string() })?;
            revisions
                .get(&version)
                .cloned()
                .ok_or_else(|| StoreError::VersionNotFound {
                    id: id.to_string(),
                    version,
                })
        })
    }

    fn get_by_version_range(
        &self,
        id: &str,
        start: Version,
        end: Version,
    ) -> Result<Vec<Entity>> {
        self.with_state(|state| {
            let (start, end) = match normalize_range(start, end) {
                Some(range) => range,
                None => return Ok(Vec::new()),
            };
            Ok(state
                .revisions
                .get(id)
                .map(|revisions| revisions.range(start..=end).map(|(_, e)| e.clone()).collect())
                .unwrap_or_default())
        })
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::InMemory
    }
}
