//! Main entry point for revstore.
//!
//! This module provides [`Store`], which selects a backend from configuration
//! and exposes it through the [`EventStore`] contract.

use revstore_concurrency::RetryPolicy;
use revstore_core::config::BACKEND;
use revstore_core::{
    BackendKind, ConcurrencyMode, Entity, EventStore, Result, StoreConfig, Version,
};
use revstore_storage::{
    DocumentDriver, DocumentStore, InMemoryStore, MemoryDocumentDriver, MemoryTableDriver,
    TableDriver, TableStore,
};
use std::sync::Arc;

/// The backend variants, chosen once at construction
pub enum Backend {
    /// Process-local store
    InMemory(InMemoryStore),
    /// Document database store
    Document(DocumentStore),
    /// Table store
    Table(TableStore),
}

impl Backend {
    fn inner(&self) -> &dyn EventStore {
        match self {
            Backend::InMemory(s) => s,
            Backend::Document(s) => s,
            Backend::Table(s) => s,
        }
    }
}

impl EventStore for Backend {
    fn init(&self, config: &StoreConfig) -> Result<()> {
        self.inner().init(config)
    }

    fn add(&self, entity: Entity) -> Result<Entity> {
        self.inner().add(entity)
    }

    fn append(&self, entity: Entity, mode: ConcurrencyMode) -> Result<Entity> {
        self.inner().append(entity, mode)
    }

    fn get_latest_version_number(&self, id: &str) -> Result<Version> {
        self.inner().get_latest_version_number(id)
    }

    fn get_by_version(&self, id: &str, version: Version) -> Result<Entity> {
        self.inner().get_by_version(id, version)
    }

    fn get_by_version_range(
        &self,
        id: &str,
        start: Version,
        end: Version,
    ) -> Result<Vec<Entity>> {
        self.inner().get_by_version_range(id, start, end)
    }

    fn backend_kind(&self) -> BackendKind {
        self.inner().backend_kind()
    }
}

/// A versioned entity store.
///
/// Create one with [`Store::in_memory`], [`Store::open`] or
/// [`Store::builder`]. The returned store is already initialized.
///
/// # Example
///
/// ```ignore
/// use revstore::prelude::*;
///
/// let store = Store::in_memory()?;
/// store.add(Entity::new("order-1", json!({"state": "new"})))?;
/// let next = store.append(
///     Entity::new("order-1", json!({"state": "paid"})).with_version(1),
///     ConcurrencyMode::Optimistic,
/// )?;
/// assert_eq!(next.version, 2);
/// ```
pub struct Store {
    backend: Backend,
    config: StoreConfig,
}

impl Store {
    /// Open an initialized in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::builder().backend(BackendKind::InMemory).open()
    }

    /// Open the backend named by the `backend` key of `config`.
    ///
    /// Service-backed variants talk to the in-process emulators; use
    /// [`Store::builder`] to supply real drivers.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::builder().config(config).open()
    }

    /// Create a builder for store configuration.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// The selected backend
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Configuration the store was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl EventStore for Store {
    fn init(&self, config: &StoreConfig) -> Result<()> {
        self.backend.init(config)
    }

    fn add(&self, entity: Entity) -> Result<Entity> {
        self.backend.add(entity)
    }

    fn append(&self, entity: Entity, mode: ConcurrencyMode) -> Result<Entity> {
        self.backend.append(entity, mode)
    }

    fn get_latest_version_number(&self, id: &str) -> Result<Version> {
        self.backend.get_latest_version_number(id)
    }

    fn get_by_version(&self, id: &str, version: Version) -> Result<Entity> {
        self.backend.get_by_version(id, version)
    }

    fn get_by_version_range(
        &self,
        id: &str,
        start: Version,
        end: Version,
    ) -> Result<Vec<Entity>> {
        self.backend.get_by_version_range(id, start, end)
    }

    fn backend_kind(&self) -> BackendKind {
        self.backend.backend_kind()
    }
}

/// Builder for [`Store`].
///
/// # Example
///
/// ```ignore
/// let driver = Arc::new(MemoryTableDriver::new());
/// let store = Store::builder()
///     .backend(BackendKind::Table)
///     .config(config)
///     .table_driver(driver)
///     .retry_policy(RetryPolicy::immediate(4))
///     .open()?;
/// ```
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    document_driver: Option<Arc<dyn DocumentDriver>>,
    table_driver: Option<Arc<dyn TableDriver>>,
    retry_policy: Option<RetryPolicy>,
}

impl StoreBuilder {
    /// Create a builder with an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `config` into the builder's configuration.
    pub fn config(mut self, config: StoreConfig) -> Self {
        for (key, value) in config.iter() {
            self.config.set(key, value);
        }
        self
    }

    /// Set one configuration property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.set(key, value);
        self
    }

    /// Select the backend variant.
    pub fn backend(self, kind: BackendKind) -> Self {
        self.property(BACKEND, kind.as_str())
    }

    /// Driver used by the document backend.
    pub fn document_driver(mut self, driver: Arc<dyn DocumentDriver>) -> Self {
        self.document_driver = Some(driver);
        self
    }

    /// Driver used by the table backend.
    pub fn table_driver(mut self, driver: Arc<dyn TableDriver>) -> Self {
        self.table_driver = Some(driver);
        self
    }

    /// Retry policy for appends, overriding any `retry.*` properties.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Construct and initialize the store.
    pub fn open(self) -> Result<Store> {
        let kind = self.config.backend_kind()?;
        let policy = match self.retry_policy {
            Some(policy) => policy,
            None => RetryPolicy::from_config(&self.config)?,
        };

        let backend = match kind {
            BackendKind::InMemory => Backend::InMemory(InMemoryStore::new()),
            BackendKind::Document => {
                let driver = self
                    .document_driver
                    .unwrap_or_else(|| {
                        Arc::new(MemoryDocumentDriver::new()) as Arc<dyn DocumentDriver>
                    });
                Backend::Document(DocumentStore::with_retry_policy(driver, policy))
            }
            BackendKind::Table => {
                let driver = self
                    .table_driver
                    .unwrap_or_else(|| {
                        Arc::new(MemoryTableDriver::new()) as Arc<dyn TableDriver>
                    });
                Backend::Table(TableStore::with_retry_policy(driver, policy))
            }
        };
        backend.init(&self.config)?;
        tracing::debug!(backend = %kind, "store opened");

        Ok(Store {
            backend,
            config: self.config,
        })
    }
}
