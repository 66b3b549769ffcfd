//! In-process table service
//!
//! Implements [`TableDriver`] with one DashMap shard per (table, partition
//! key). Rows inside a partition sit in a `BTreeMap` so partition scans come
//! back in row-key order, as the real service returns them.

use super::driver::{RowRange, TableDriver, TableEntity};
use crate::driver::{DriverError, DriverResult, ETag};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;

type PartitionAddr = (String, String);

/// Table service emulator
#[derive(Debug, Default)]
pub struct MemoryTableDriver {
    /// Accepted account key; any key when `None`
    account_key: Option<String>,
    account: RwLock<Option<String>>,
    tables: DashMap<String, ()>,
    partitions: DashMap<PartitionAddr, BTreeMap<String, TableEntity>>,
    /// Per table: number of upcoming writes to reject
    faults: DashMap<String, u32>,
}

impl MemoryTableDriver {
    /// Emulator accepting any credentials
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulator that rejects every key but `account_key`
    pub fn with_account_key(account_key: impl Into<String>) -> Self {
        Self {
            account_key: Some(account_key.into()),
            ..Self::default()
        }
    }

    /// Reject the next `n` inserts or updates against `table` with `Unavailable`
    pub fn fail_next_writes(&self, table: &str, n: u32) {
        self.faults.insert(table.to_string(), n);
    }

    /// Account of the current session
    pub fn connected_account(&self) -> Option<String> {
        self.account.read().clone()
    }

    /// Whether the table has been created
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Number of rows in one partition
    pub fn partition_len(&self, table: &str, partition_key: &str) -> usize {
        self.partitions
            .get(&(table.to_string(), partition_key.to_string()))
            .map(|p| p.len())
            .unwrap_or(0)
    }

    fn check_table(&self, table: &str) -> DriverResult<()> {
        if self.account.read().is_none() {
            return Err(DriverError::Unavailable("not connected".to_string()));
        }
        if !self.tables.contains_key(table) {
            return Err(DriverError::NotFound(format!("table {}", table)));
        }
        Ok(())
    }

    fn take_fault(&self, table: &str) -> DriverResult<()> {
        if let Some(mut remaining) = self.faults.get_mut(table) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Unavailable(format!(
                    "injected write fault on {}",
                    table
                )));
            }
        }
        Ok(())
    }
}

/// Table names: 3 to 63 ASCII alphanumerics, starting with a letter
pub fn is_valid_table_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

impl TableDriver for MemoryTableDriver {
    fn connect(&self, account_name: &str, account_key: &str) -> DriverResult<()> {
        if let Some(expected) = &self.account_key {
            if expected != account_key {
                return Err(DriverError::Unauthorized);
            }
        }
        *self.account.write() = Some(account_name.to_string());
        Ok(())
    }

    fn ensure_table(&self, table: &str) -> DriverResult<()> {
        if self.account.read().is_none() {
            return Err(DriverError::Unavailable("not connected".to_string()));
        }
        if !is_valid_table_name(table) {
            return Err(DriverError::Malformed(format!("invalid table name '{}'", table)));
        }
        self.tables.entry(table.to_string()).or_insert(());
        Ok(())
    }

    fn insert_entity(&self, table: &str, mut entity: TableEntity) -> DriverResult<ETag> {
        self.check_table(table)?;
        self.take_fault(table)?;
        let mut partition = self
            .partitions
            .entry((table.to_string(), entity.partition_key.clone()))
            .or_default();
        if partition.contains_key(&entity.row_key) {
            return Err(DriverError::Conflict);
        }
        let etag = ETag::generate();
        entity.etag = Some(etag.clone());
        partition.insert(entity.row_key.clone(), entity);
        Ok(etag)
    }

    fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> DriverResult<Option<TableEntity>> {
        self.check_table(table)?;
        Ok(self
            .partitions
            .get(&(table.to_string(), partition_key.to_string()))
            .and_then(|p| p.get(row_key).cloned()))
    }

    fn update_entity(
        &self,
        table: &str,
        mut entity: TableEntity,
        if_match: &ETag,
    ) -> DriverResult<ETag> {
        self.check_table(table)?;
        self.take_fault(table)?;
        let mut partition = self
            .partitions
            .get_mut(&(table.to_string(), entity.partition_key.clone()))
            .ok_or_else(|| DriverError::NotFound(format!("row {}", entity.row_key)))?;
        let existing = partition
            .get_mut(&entity.row_key)
            .ok_or_else(|| DriverError::NotFound(format!("row {}", entity.row_key)))?;
        if existing.etag.as_ref() != Some(if_match) {
            return Err(DriverError::PreconditionFailed);
        }
        let etag = ETag::generate();
        entity.etag = Some(etag.clone());
        *existing = entity;
        Ok(etag)
    }

    fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
        rows: Option<RowRange>,
    ) -> DriverResult<Vec<TableEntity>> {
        self.check_table(table)?;
        let partition = match self
            .partitions
            .get(&(table.to_string(), partition_key.to_string()))
        {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };
        let found = match rows {
            Some((low, high)) if low <= high => {
                partition.range(low..=high).map(|(_, e)| e.clone()).collect()
            }
            Some(_) => Vec::new(),
            None => partition.values().cloned().collect(),
        };
        Ok(found)
    }
}
