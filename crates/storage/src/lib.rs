//! Storage backends for revstore
//!
//! This crate implements the [`EventStore`](revstore_core::EventStore) contract three ways:
//! - [`InMemoryStore`]: process-local maps behind one mutex
//! - [`DocumentStore`]: a partitioned document database with ETags and transactional batches
//! - [`TableStore`]: a table store with partition/row keys and ETags
//!
//! The document and table backends talk to their service through a driver
//! trait ([`DocumentDriver`], [`TableDriver`]). In-process emulators of both
//! services ([`MemoryDocumentDriver`], [`MemoryTableDriver`]) honour the same
//! conditional-write semantics and are used by the test suites.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod driver;
pub mod memory;
pub mod table;

pub use document::{DocumentDriver, DocumentStore, MemoryDocumentDriver};
pub use driver::{DriverError, DriverResult, ETag};
pub use memory::InMemoryStore;
pub use table::{MemoryTableDriver, TableDriver, TableStore};
