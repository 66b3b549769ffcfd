//! Table store driver contract
//!
//! Models a schemaless table service: tables hold entities addressed by
//! (partition key, row key), each carrying typed properties and an ETag that
//! changes on every write. Rows of one partition are ordered by row key.
//! There are no transactions spanning tables.

use crate::driver::{DriverResult, ETag};
use std::collections::BTreeMap;

/// A typed property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// 64-bit signed integer
    Int64(i64),
    /// Raw bytes
    Binary(Vec<u8>),
    /// UTF-8 text
    String(String),
}

/// One table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntity {
    /// Partition key
    pub partition_key: String,
    /// Row key, unique within the partition
    pub row_key: String,
    /// Named properties
    pub properties: BTreeMap<String, Property>,
    /// ETag assigned by the service; `None` on rows not yet written
    pub etag: Option<ETag>,
}

impl TableEntity {
    /// Row with no properties
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: BTreeMap::new(),
            etag: None,
        }
    }

    /// Set a property, returning the updated row
    pub fn with(mut self, name: impl Into<String>, value: Property) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Integer property, `None` if absent or of another type
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.properties.get(name) {
            Some(Property::Int64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Binary property, `None` if absent or of another type
    pub fn get_binary(&self, name: &str) -> Option<&[u8]> {
        match self.properties.get(name) {
            Some(Property::Binary(v)) => Some(v),
            _ => None,
        }
    }
}

/// Inclusive row-key range
pub type RowRange = (String, String);

/// Client of a table service
pub trait TableDriver: Send + Sync {
    /// Establish a session for a storage account
    fn connect(&self, account_name: &str, account_key: &str) -> DriverResult<()>;

    /// Create the table if absent
    fn ensure_table(&self, table: &str) -> DriverResult<()>;

    /// Insert a row; `Conflict` if (partition key, row key) exists
    fn insert_entity(&self, table: &str, entity: TableEntity) -> DriverResult<ETag>;

    /// Point read, including the current ETag
    fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> DriverResult<Option<TableEntity>>;

    /// Replace an existing row if its ETag still matches; `PreconditionFailed` otherwise
    fn update_entity(&self, table: &str, entity: TableEntity, if_match: &ETag)
        -> DriverResult<ETag>;

    /// Rows of one partition, ascending by row key, optionally limited to an inclusive row-key range
    fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
        rows: Option<RowRange>,
    ) -> DriverResult<Vec<TableEntity>>;
}
