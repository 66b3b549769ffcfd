//! Core types for revstore
//!
//! This crate defines the vocabulary shared by every other crate:
//! - [`Entity`]: a versioned revision of a caller-identified record
//! - [`ConcurrencyMode`]: per-call optimistic or blind append semantics
//! - [`StoreError`]: the error taxonomy surfaced by every backend
//! - [`StoreConfig`]: flat string configuration consumed at init
//! - [`EventStore`]: the backend contract

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod concurrency;
pub mod config;
pub mod entity;
pub mod error;
pub mod traits;

pub use concurrency::ConcurrencyMode;
pub use config::{BackendKind, StoreConfig};
pub use entity::{Entity, Version, FIRST_VERSION};
pub use error::{ErrorKind, Result, StoreError};
pub use traits::EventStore;
