//! Convenient imports for revstore.
//!
//! ```ignore
//! use revstore::prelude::*;
//!
//! let store = Store::in_memory()?;
//! store.add(Entity::new("a", json!(1)))?;
//! ```

// Main entry point
pub use crate::store::{Store, StoreBuilder};

// The contract and its types
pub use crate::types::{
    BackendKind, ConcurrencyMode, Entity, EventStore, StoreConfig, Version,
};

// Error handling
pub use crate::types::{ErrorKind, Result, StoreError};

// Retry tuning
pub use crate::types::RetryPolicy;

// Re-export serde_json for convenience
pub use serde_json::json;
