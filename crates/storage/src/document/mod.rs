//! Document database backend
//!
//! Layout: one container partitioned on `/entityId`. Each entity id owns a
//! partition holding
//! - one version document (`type = "version"`, `id = <entity id>`)
//! - one revision document per version (`type = "entity"`, `id = "<entity id>--<version>"`)
//!
//! Because the version document and the revisions share a partition, `add`
//! and `append` write both in a single transactional batch: the version
//! replace is guarded by the ETag read at the start of the attempt, and the
//! revision insert commits or rolls back with it. No reader can observe an
//! advanced version without its revision.
//!
//! ## Configuration
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `url` | service endpoint |
//! | `masterKey` | account key |
//! | `database` | database name, created if absent |
//! | `container` | container name, created if absent |

pub mod driver;
pub mod emulator;

pub use driver::{BatchOperation, ContainerRef, DocumentDriver, DocumentQuery, StoredDocument};
pub use emulator::MemoryDocumentDriver;

use crate::driver::{missing_revision, DriverError, ETag};
use parking_lot::RwLock;
use revstore_concurrency::{CasOutcome, RetryPolicy, VersionAssigner, VersionLedger, VersionRead};
use revstore_core::traits::normalize_range;
use revstore_core::{
    BackendKind, ConcurrencyMode, Entity, EventStore, Result, StoreConfig, StoreError, Version,
    FIRST_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Config key: service endpoint
pub const URL: &str = "url";
/// Config key: account key
pub const MASTER_KEY: &str = "masterKey";
/// Config key: database name
pub const DATABASE: &str = "database";
/// Config key: container name
pub const CONTAINER: &str = "container";

/// Partition key path of the container
pub const PARTITION_KEY_PATH: &str = "/entityId";

const VERSION_TYPE: &str = "version";
const ENTITY_TYPE: &str = "entity";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionDocument {
    id: String,
    entity_id: String,
    version: Version,
    #[serde(rename = "type")]
    doc_type: String,
}

impl VersionDocument {
    fn new(entity_id: &str, version: Version) -> Self {
        Self {
            id: entity_id.to_string(),
            entity_id: entity_id.to_string(),
            version,
            doc_type: VERSION_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionDocument {
    id: String,
    entity_id: String,
    version: Version,
    metadata: String,
    #[serde(rename = "type")]
    doc_type: String,
    data: Value,
}

impl RevisionDocument {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            id: revision_id(&entity.id, entity.version),
            entity_id: entity.id.clone(),
            version: entity.version,
            metadata: entity.metadata.clone(),
            doc_type: ENTITY_TYPE.to_string(),
            data: entity.data.clone(),
        }
    }

    fn into_entity(self) -> Entity {
        Entity {
            id: self.entity_id,
            version: self.version,
            metadata: self.metadata,
            data: self.data,
        }
    }
}

fn revision_id(entity_id: &str, version: Version) -> String {
    format!("{}--{}", entity_id, version)
}

fn encode<T: Serialize>(doc: &T) -> Result<Value> {
    Ok(serde_json::to_value(doc)?)
}

fn decode<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T> {
    Ok(serde_json::from_value(body)?)
}

/// Entity store over a document database
pub struct DocumentStore {
    driver: Arc<dyn DocumentDriver>,
    /// Container in use, `None` until `init`
    container: RwLock<Option<ContainerRef>>,
    assigner: VersionAssigner,
}

impl DocumentStore {
    /// Create a store that talks to the service through `driver`
    pub fn new(driver: Arc<dyn DocumentDriver>) -> Self {
        Self::with_retry_policy(driver, RetryPolicy::default())
    }

    /// Create a store with an explicit retry policy for appends
    pub fn with_retry_policy(driver: Arc<dyn DocumentDriver>, policy: RetryPolicy) -> Self {
        Self {
            driver,
            container: RwLock::new(None),
            assigner: VersionAssigner::new(policy),
        }
    }

    /// Container in use, if initialized
    pub fn container(&self) -> Option<ContainerRef> {
        self.container.read().clone()
    }

    fn ledger(&self) -> Result<DocumentLedger<'_>> {
        let container = self.container().ok_or(StoreError::NotInitialized)?;
        Ok(DocumentLedger {
            driver: self.driver.as_ref(),
            container,
        })
    }
}

impl EventStore for DocumentStore {
    fn init(&self, config: &StoreConfig) -> Result<()> {
        let url = config.require(URL)?;
        let master_key = config.require(MASTER_KEY)?;
        let container = ContainerRef::new(config.require(DATABASE)?, config.require(CONTAINER)?);

        self.driver
            .connect(url, master_key)
            .map_err(|e| e.into_init_error("connect"))?;
        self.driver
            .ensure_database(&container.database)
            .map_err(|e| e.into_init_error("ensure database"))?;
        self.driver
            .ensure_container(&container, PARTITION_KEY_PATH)
            .map_err(|e| e.into_init_error("ensure container"))?;

        tracing::info!(
            backend = "document",
            database = %container.database,
            container = %container.container,
            "store initialized"
        );
        *self.container.write() = Some(container);
        Ok(())
    }

    fn add(&self, entity: Entity) -> Result<Entity> {
        entity.validate()?;
        let ledger = self.ledger()?;
        let revision = entity.at_version(FIRST_VERSION);

        let operations = vec![
            BatchOperation::Create(encode(&VersionDocument::new(&revision.id, FIRST_VERSION))?),
            BatchOperation::Create(encode(&RevisionDocument::from_entity(&revision))?),
        ];
        match ledger
            .driver
            .execute_batch(&ledger.container, &revision.id, operations)
        {
            Ok(_) => Ok(revision),
            Err(DriverError::Conflict) => Err(StoreError::EntityAlreadyExists { id: revision.id }),
            Err(e) => Err(e.into_store_error("add", &revision.id)),
        }
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
            .read_document(&ledger.container, id, &revision_id(id, version))
            .map_err(|e| e.into_store_error("get_by_version", id))?;
        match found {
            Some(doc) => Ok(decode::<RevisionDocument>(doc.body)?.into_entity()),
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
        let query = DocumentQuery::new()
            .eq("type", ENTITY_TYPE)
            .eq("entityId", id)
            .between("version", start, end);
        let docs = ledger
            .driver
            .query_documents(&ledger.container, id, &query)
            .map_err(|e| e.into_store_error("get_by_version_range", id))?;

        let mut entities = docs
            .into_iter()
            .map(|doc| decode::<RevisionDocument>(doc.body).map(RevisionDocument::into_entity))
            .collect::<Result<Vec<_>>>()?;
        entities.sort_by_key(|e| e.version);
        Ok(entities)
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Document
    }
}

/// Protocol view of one container
struct DocumentLedger<'a> {
    driver: &'a dyn DocumentDriver,
    container: ContainerRef,
}

impl VersionLedger for DocumentLedger<'_> {
    type Token = ETag;

    fn read_version(&self, id: &str) -> Result<Option<VersionRead<ETag>>> {
        let found = self
            .driver
            .read_document(&self.container, id, id)
            .map_err(|e| e.into_store_error("read_version", id))?;
        match found {
            None => Ok(None),
            Some(doc) => {
                let record: VersionDocument = decode(doc.body)?;
                Ok(Some(VersionRead {
                    version: record.version,
                    token: doc.etag,
                }))
            }
        }
    }

    fn try_commit(&self, revision: &Entity, token: &ETag) -> Result<CasOutcome> {
        let operations = vec![
            BatchOperation::Replace {
                body: encode(&VersionDocument::new(&revision.id, revision.version))?,
                if_match: token.clone(),
            },
            BatchOperation::Create(encode(&RevisionDocument::from_entity(revision))?),
        ];
        match self
            .driver
            .execute_batch(&self.container, &revision.id, operations)
        {
            Ok(_) => Ok(CasOutcome::Committed),
            Err(DriverError::PreconditionFailed) => Ok(CasOutcome::Lost),
            Err(e) => Err(e.into_store_error("append", &revision.id)),
        }
    }
}
