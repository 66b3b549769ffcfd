//! Document database driver contract
//!
//! Models a partitioned document service: databases hold containers,
//! containers hold JSON documents addressed by (partition key, `id`).
//! Every write regenerates the document's ETag. A transactional batch runs
//! several operations against one partition all-or-nothing.

use crate::driver::{DriverResult, ETag};
use serde_json::Value;

/// Address of a container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerRef {
    /// Database name
    pub database: String,
    /// Container name
    pub container: String,
}

impl ContainerRef {
    /// Create a container address
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            container: container.into(),
        }
    }
}

/// A document body with its current ETag
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// JSON body, always an object with a string `id`
    pub body: Value,
    /// Current ETag
    pub etag: ETag,
}

/// One operation of a transactional batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Insert; fails with `Conflict` if the id exists
    Create(Value),
    /// Overwrite an existing document if its ETag still matches
    Replace {
        /// New body (its `id` selects the target)
        body: Value,
        /// ETag the caller last saw
        if_match: ETag,
    },
}

/// Filter over documents of one partition
///
/// Equality on top-level fields plus an optional inclusive numeric range on
/// one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    /// Top-level fields that must equal the given values
    pub equals: Vec<(String, Value)>,
    /// Inclusive range on an unsigned integer field
    pub between: Option<(String, u64, u64)>,
}

impl DocumentQuery {
    /// Empty filter, matches every document of the partition
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    /// Require `low <= field <= high`
    pub fn between(mut self, field: impl Into<String>, low: u64, high: u64) -> Self {
        self.between = Some((field.into(), low, high));
        self
    }

    /// Whether `body` passes the filter
    pub fn matches(&self, body: &Value) -> bool {
        let equal = self
            .equals
            .iter()
            .all(|(field, value)| body.get(field) == Some(value));
        let in_range = match &self.between {
            None => true,
            Some((field, low, high)) => body
                .get(field)
                .and_then(Value::as_u64)
                .map(|v| *low <= v && v <= *high)
                .unwrap_or(false),
        };
        equal && in_range
    }
}

/// Client of a document database service
pub trait DocumentDriver: Send + Sync {
    /// Establish a session
    fn connect(&self, endpoint: &str, master_key: &str) -> DriverResult<()>;

    /// Create the database if absent
    fn ensure_database(&self, database: &str) -> DriverResult<()>;

    /// Create the container if absent, partitioned on `partition_key_path`
    fn ensure_container(&self, container: &ContainerRef, partition_key_path: &str)
        -> DriverResult<()>;

    /// Insert a document; `Conflict` if its id exists in the partition
    fn create_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        body: Value,
    ) -> DriverResult<ETag>;

    /// Point read by id
    fn read_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        id: &str,
    ) -> DriverResult<Option<StoredDocument>>;

    /// Conditional overwrite; `PreconditionFailed` on a stale ETag
    fn replace_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        body: Value,
        if_match: &ETag,
    ) -> DriverResult<ETag>;

    /// Documents of one partition passing `query`, in no particular order
    fn query_documents(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        query: &DocumentQuery,
    ) -> DriverResult<Vec<StoredDocument>>;

    /// Run `operations` atomically within one partition
    ///
    /// Either every operation applies or none does; the first failing
    /// operation's error is returned.
    fn execute_batch(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> DriverResult<Vec<ETag>>;
}
