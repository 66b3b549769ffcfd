//! # revstore
//!
//! Versioned entity store with optimistic concurrency.
//!
//! Every entity is a history of immutable revisions numbered 1, 2, 3, ...
//! Writers append the next revision; under [`ConcurrencyMode::Optimistic`]
//! they must present the version they last read, and a stale one is rejected
//! with a version conflict instead of silently overwriting a concurrent
//! write.
//!
//! ## Quick Start
//!
//! ```ignore
//! use revstore::prelude::*;
//!
//! let store = Store::in_memory()?;
//!
//! let first = store.add(Entity::new("cart-7", json!({"items": 1})))?;
//! assert_eq!(first.version, 1);
//!
//! let second = store.append(
//!     Entity::new("cart-7", json!({"items": 2})).with_version(1),
//!     ConcurrencyMode::Optimistic,
//! )?;
//! assert_eq!(second.version, 2);
//!
//! // A writer still holding version 1 loses
//! let stale = store.append(
//!     Entity::new("cart-7", json!({"items": 5})).with_version(1),
//!     ConcurrencyMode::Optimistic,
//! );
//! assert!(stale.unwrap_err().is_conflict());
//!
//! let history = store.get_by_version_range("cart-7", 1, 2)?;
//! ```
//!
//! ## Backends
//!
//! | `backend` | Storage | Atomicity of bump + write |
//! |-----------|---------|---------------------------|
//! | `memory` | process-local maps | one mutex |
//! | `document` | document database | transactional batch |
//! | `table` | table store | none, holes surface as `IncompleteWrite` |
//!
//! Select one with the `backend` configuration key and open it with
//! [`Store::open`], or wire drivers explicitly with [`Store::builder`].

#![warn(missing_docs)]

mod store;
mod types;

pub mod prelude;

// Re-export main entry points
pub use store::{Backend, Store, StoreBuilder};
pub use types::*;
