//! Table store backend
//!
//! Two tables, both partitioned by entity id:
//!
//! | table | row key | properties |
//! |-------|---------|------------|
//! | `eventstoreversion<suffix>` | entity id | `version: Int64` |
//! | `eventstoreentities<suffix>` | version, zero-padded to 20 digits | `data: Binary` (MessagePack entity) |
//!
//! Padding the row key keeps lexicographic row order equal to numeric
//! version order, so a range read is one partition scan.
//!
//! The service has no transaction spanning both tables. `add` inserts the
//! version row first (the uniqueness guard) and then the revision; `append`
//! advances the version row with an if-match update and then inserts the
//! revision. If the second write fails the version has advanced without a
//! revision: the caller gets `Internal`, and readers report the hole as
//! `IncompleteWrite`.
//!
//! ## Configuration
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `storageAccountName` | account name |
//! | `storageAccountKey` | account key |
//! | `tableNameSuffix` | optional, alphanumeric, appended to both table names |

pub mod driver;
pub mod emulator;

pub use driver::{Property, RowRange, TableDriver, TableEntity};
pub use emulator::MemoryTableDriver;

use crate::driver::{missing_revision, DriverError, ETag};
use parking_lot::RwLock;
use revstore_concurrency::{CasOutcome, RetryPolicy, VersionAssigner, VersionLedger, VersionRead};
use revstore_core::traits::normalize_range;
use revstore_core::{
    BackendKind, ConcurrencyMode, Entity, EventStore, Result, StoreConfig, StoreError, Version,
    FIRST_VERSION,
};
use std::sync::Arc;

/// Config key: storage account name
pub const ACCOUNT_NAME: &str = "storageAccountName";
/// Config key: storage account key
pub const ACCOUNT_KEY: &str = "storageAccountKey";
/// Config key: suffix appended to both table names
pub const TABLE_NAME_SUFFIX: &str = "tableNameSuffix";

/// Base name of the revision table
pub const ENTITY_TABLE: &str = "eventstoreentities";
/// Base name of the version table
pub const VERSION_TABLE: &str = "eventstoreversion";

const VERSION_PROPERTY: &str = "version";
const DATA_PROPERTY: &str = "data";

/// Physical table names in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Revision table
    pub entities: String,
    /// Version table
    pub versions: String,
}

impl TableNames {
    /// Table names for an optional suffix
    pub fn with_suffix(suffix: &str) -> Self {
        Self {
            entities: format!("{}{}", ENTITY_TABLE, suffix),
            versions: format!("{}{}", VERSION_TABLE, suffix),
        }
    }
}

fn row_key(version: Version) -> String {
    format!("{:020}", version)
}

fn to_stored(operation: &'static str, id: &str, version: Version) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| StoreError::internal(operation, id, "version exceeds table integer range"))
}

fn version_row(operation: &'static str, id: &str, version: Version) -> Result<TableEntity> {
    let stored = to_stored(operation, id, version)?;
    Ok(TableEntity::new(id, id).with(VERSION_PROPERTY, Property::Int64(stored)))
}

fn revision_row(revision: &Entity) -> Result<TableEntity> {
    let data = rmp_serde::to_vec_named(revision)
        .map_err(|e| StoreError::Serialization(format!("encode {}: {}", revision.id, e)))?;
    Ok(TableEntity::new(&revision.id, row_key(revision.version))
        .with(DATA_PROPERTY, Property::Binary(data)))
}

fn decode_revision(row: &TableEntity) -> Result<Entity> {
    let data = row.get_binary(DATA_PROPERTY).ok_or_else(|| {
        StoreError::Serialization(format!(
            "revision row {}/{} has no binary data",
            row.partition_key, row.row_key
        ))
    })?;
    rmp_serde::from_slice(data)
        .map_err(|e| StoreError::Serialization(format!("decode {}: {}", row.partition_key, e)))
}

/// Entity store over a table service
pub struct TableStore {
    driver: Arc<dyn TableDriver>,
    /// `None` until `init`
    tables: RwLock<Option<TableNames>>,
    assigner: VersionAssigner,
}

impl TableStore {
    /// Create a store that talks to the service through `driver`
    pub fn new(driver: Arc<dyn TableDriver>) -> Self {
        Self::with_retry_policy(driver, RetryPolicy::default())
    }

    /// Create a store with an explicit retry policy for appends
    pub fn with_retry_policy(driver: Arc<dyn TableDriver>, policy: RetryPolicy) -> Self {
        Self {
            driver,
            tables: RwLock::new(None),
            assigner: VersionAssigner::new(policy),
        }
    }

    /// Table names in use, if initialized
    pub fn tables(&self) -> Option<TableNames> {
        self.tables.read().clone()
    }

    fn ledger(&self) -> Result<TableLedger<'_>> {
        let tables = self.tables().ok_or(StoreError::NotInitialized)?;
        Ok(TableLedger {
            driver: self.driver.as_ref(),
            tables,
        })
    }
}

impl EventStore for TableStore {
    fn init(&self, config: &StoreConfig) -> Result<()> {
        let account = config.require(ACCOUNT_NAME)?;
        let key = config.require(ACCOUNT_KEY)?;
        let suffix = config.get(TABLE_NAME_SUFFIX).unwrap_or("");
        if !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StoreError::config(
                TABLE_NAME_SUFFIX,
                "table name suffix must be alphanumeric",
            ));
        }
        let tables = TableNames::with_suffix(suffix);

        self.driver
            .connect(account, key)
            .map_err(|e| e.into_init_error("connect"))?;
        for table in [&tables.entities, &tables.versions] {
            self.driver
                .ensure_table(table)
                .map_err(|e| e.into_init_error("ensure table"))?;
        }

        tracing::info!(
            backend = "table",
            entities = %tables.entities,
            versions = %tables.versions,
            "store initialized"
        );
        *self.tables.write() = Some(tables);
        Ok(())
    }

    fn add(&self, entity: Entity) -> Result<Entity> {
        entity.validate()?;
        let ledger = self.ledger()?;
        let revision = entity.at_version(FIRST_VERSION);
        let version = version_row("add", &revision.id, FIRST_VERSION)?;
        let row = revision_row(&revision)?;

        match ledger.driver.insert_entity(&ledger.tables.versions, version) {
            Ok(_) => {}
            Err(DriverError::Conflict) => {
                return Err(StoreError::EntityAlreadyExists { id: revision.id })
            }
            Err(e) => return Err(e.into_store_error("add", &revision.id)),
        }
        ledger.insert_revision("add", &revision, row)?;
        Ok(revision)
    }

    fn append(&self, entity: Entity, mode: ConcurrencyMode) -> Result<Entity> {
        let ledger = self.ledger()?;
        self.assigner.append(&ledger, entity, mode)
    }

    fn get_latest_version_number(&self, id: &str) -> Result<Version> {
        let ledger = self.ledger()?;
        ledger
            .read_version(id)?
            .map(|read| read.version)
            .ok_or_else(|| StoreError::EntityNotFound { id: id.to_string() })
    }

    fn get_by_version(&self, id: &str, version: Version) -> Result<Entity> {
        let ledger = self.ledger()?;
        let found = ledger
            .driver
            .get_entity(&ledger.tables.entities, id, &row_key(version))
            .map_err(|e| e.into_store_error("get_by_version", id))?;
        match found {
            Some(row) => decode_revision(&row),
            None => Err(missing_revision(id, version, ledger.read_version(id)?)),
        }
    }

    fn get_by_version_range(
        &self,
        id: &str,
        start: Version,
        end: Version,
    ) -> Result<Vec<Entity>> {
        let ledger = self.ledger()?;
        let (start, end) = match normalize_range(start, end) {
            Some(range) => range,
            None => return Ok(Vec::new()),
        };
        let rows = ledger
            .driver
            .query_partition(
                &ledger.tables.entities,
                id,
                Some((row_key(start), row_key(end))),
            )
            .map_err(|e| e.into_store_error("get_by_version_range", id))?;
        let entities = rows.iter().map(decode_revision).collect::<Result<Vec<_>>>()?;

        if let Some(latest) = ledger.read_version(id)?.map(|read| read.version) {
            let upper = end.min(latest);
            let expected = if upper >= start { upper - start + 1 } else { 0 };
            let missing = expected.saturating_sub(entities.len() as u64);
            if missing > 0 {
                tracing::warn!(
                    id,
                    start,
                    end,
                    latest,
                    missing,
                    "range read skipped incomplete writes"
                );
            }
        }
        Ok(entities)
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Table
    }
}

/// Protocol view of the two tables
struct TableLedger<'a> {
    driver: &'a dyn TableDriver,
    tables: TableNames,
}

impl TableLedger<'_> {
    fn insert_revision(
        &self,
        operation: &'static str,
        revision: &Entity,
        row: TableEntity,
    ) -> Result<()> {
        self.driver
            .insert_entity(&self.tables.entities, row)
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(
                    id = %revision.id,
                    version = revision.version,
                    operation,
                    error = %e,
                    "version advanced but revision write failed"
                );
                e.into_store_error(operation, &revision.id)
            })
    }
}

impl VersionLedger for TableLedger<'_> {
    type Token = ETag;

    fn read_version(&self, id: &str) -> Result<Option<VersionRead<ETag>>> {
        let row = match self
            .driver
            .get_entity(&self.tables.versions, id, id)
            .map_err(|e| e.into_store_error("read_version", id))?
        {
            Some(row) => row,
            None => return Ok(None),
        };
        let version = row
            .get_i64(VERSION_PROPERTY)
            .and_then(|v| Version::try_from(v).ok())
            .ok_or_else(|| {
                StoreError::Serialization(format!("version row of {} has no valid version", id))
            })?;
        let token = row.etag.ok_or_else(|| {
            StoreError::Serialization(format!("version row of {} has no etag", id))
        })?;
        Ok(Some(VersionRead { version, token }))
    }

    fn try_commit(&self, revision: &Entity, token: &ETag) -> Result<CasOutcome> {
        let update = version_row("append", &revision.id, revision.version)?;
        let row = revision_row(revision)?;
        match self
            .driver
            .update_entity(&self.tables.versions, update, token)
        {
            Ok(_) => {}
            Err(DriverError::PreconditionFailed) => return Ok(CasOutcome::Lost),
            Err(e) => return Err(e.into_store_error("append", &revision.id)),
        }
        self.insert_revision("append", revision, row)?;
        Ok(CasOutcome::Committed)
    }
}
