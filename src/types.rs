//! Public types for the revstore API.
//!
//! This module re-exports types from the member crates with a single public
//! path.

// Entities and versions
pub use revstore_core::{Entity, Version, FIRST_VERSION};

// The backend contract
pub use revstore_core::{BackendKind, ConcurrencyMode, EventStore, StoreConfig};

// Errors
pub use revstore_core::{ErrorKind, Result, StoreError};

// Version assignment
pub use revstore_concurrency::RetryPolicy;

// Backends and service drivers
pub use revstore_storage::{
    DocumentDriver, DocumentStore, DriverError, ETag, InMemoryStore, MemoryDocumentDriver,
    MemoryTableDriver, TableDriver, TableStore,
};

/// Configuration keys, grouped by consumer
pub mod keys {
    pub use revstore_concurrency::retry::{BASE_BACKOFF_MS, DEADLINE_MS, MAX_ATTEMPTS, MAX_BACKOFF_MS};
    pub use revstore_core::config::BACKEND;
    pub use revstore_storage::document::{CONTAINER, DATABASE, MASTER_KEY, URL};
    pub use revstore_storage::table::{ACCOUNT_KEY, ACCOUNT_NAME, TABLE_NAME_SUFFIX};
}
