//! In-process document database
//!
//! Implements [`DocumentDriver`] over sharded maps:
//! - DashMap keyed by (container, partition key), so different partitions never contend
//! - FxHashMap of documents inside each partition
//!
//! A transactional batch holds its partition's shard lock and stages its
//! writes in an overlay that reads through to the committed documents. The
//! overlay is merged only if every operation succeeds.

use super::driver::{BatchOperation, ContainerRef, DocumentDriver, DocumentQuery, StoredDocument};
use crate::driver::{DriverError, DriverResult, ETag};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};

type PartitionAddr = (ContainerRef, String);

#[derive(Debug, Default)]
struct Partition {
    documents: FxHashMap<String, StoredDocument>,
}

/// Document service emulator
#[derive(Debug, Default)]
pub struct MemoryDocumentDriver {
    /// Accepted key; any key when `None`
    master_key: Option<String>,
    endpoint: RwLock<Option<String>>,
    databases: DashMap<String, ()>,
    /// Container -> partition key path
    containers: DashMap<ContainerRef, String>,
    partitions: DashMap<PartitionAddr, Partition>,
    /// Upcoming batches to reject before they touch any document
    failing_batches: AtomicU32,
}

impl MemoryDocumentDriver {
    /// Emulator accepting any credentials
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulator that rejects every key but `master_key`
    pub fn with_master_key(master_key: impl Into<String>) -> Self {
        Self {
            master_key: Some(master_key.into()),
            ..Self::default()
        }
    }

    /// Reject the next `n` transactional batches with `Unavailable`
    pub fn fail_next_batches(&self, n: u32) {
        self.failing_batches.store(n, Ordering::SeqCst);
    }

    /// Endpoint of the current session
    pub fn connected_endpoint(&self) -> Option<String> {
        self.endpoint.read().clone()
    }

    /// Whether the container has been created
    pub fn has_container(&self, container: &ContainerRef) -> bool {
        self.containers.contains_key(container)
    }

    /// Number of documents stored in one partition
    pub fn partition_len(&self, container: &ContainerRef, partition_key: &str) -> usize {
        self.partitions
            .get(&(container.clone(), partition_key.to_string()))
            .map(|p| p.documents.len())
            .unwrap_or(0)
    }

    fn check_session(&self) -> DriverResult<()> {
        if self.endpoint.read().is_none() {
            return Err(DriverError::Unavailable("not connected".to_string()));
        }
        Ok(())
    }

    fn check_container(&self, container: &ContainerRef) -> DriverResult<()> {
        self.check_session()?;
        if !self.containers.contains_key(container) {
            return Err(DriverError::NotFound(format!(
                "container {}/{}",
                container.database, container.container
            )));
        }
        Ok(())
    }

    fn take_fault(&self) -> bool {
        self.failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn with_partition<T>(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        f: impl FnOnce(&mut Partition) -> DriverResult<T>,
    ) -> DriverResult<T> {
        self.check_container(container)?;
        let mut partition = self
            .partitions
            .entry((container.clone(), partition_key.to_string()))
            .or_default();
        f(partition.value_mut())
    }
}

fn document_id(body: &Value) -> DriverResult<String> {
    body.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Malformed("document has no string 'id'".to_string()))
}

/// Writes of one batch, staged over a partition's committed documents
struct Overlay<'a> {
    committed: &'a FxHashMap<String, StoredDocument>,
    staged: FxHashMap<String, StoredDocument>,
}

impl<'a> Overlay<'a> {
    fn new(committed: &'a FxHashMap<String, StoredDocument>) -> Self {
        Self {
            committed,
            staged: FxHashMap::default(),
        }
    }

    fn get(&self, id: &str) -> Option<&StoredDocument> {
        self.staged.get(id).or_else(|| self.committed.get(id))
    }

    fn apply(&mut self, op: BatchOperation) -> DriverResult<ETag> {
        let (id, body) = match op {
            BatchOperation::Create(body) => {
                let id = document_id(&body)?;
                if self.get(&id).is_some() {
                    return Err(DriverError::Conflict);
                }
                (id, body)
            }
            BatchOperation::Replace { body, if_match } => {
                let id = document_id(&body)?;
                let existing = self
                    .get(&id)
                    .ok_or_else(|| DriverError::NotFound(format!("document {}", id)))?;
                if existing.etag != if_match {
                    return Err(DriverError::PreconditionFailed);
                }
                (id, body)
            }
        };
        let etag = ETag::generate();
        self.staged.insert(
            id,
            StoredDocument {
                body,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    fn into_staged(self) -> FxHashMap<String, StoredDocument> {
        self.staged
    }
}

/// Apply `operations` all-or-nothing
fn commit(partition: &mut Partition, operations: Vec<BatchOperation>) -> DriverResult<Vec<ETag>> {
    let mut overlay = Overlay::new(&partition.documents);
    let mut etags = Vec::with_capacity(operations.len());
    for op in operations {
        etags.push(overlay.apply(op)?);
    }
    let staged = overlay.into_staged();
    partition.documents.extend(staged);
    Ok(etags)
}

fn commit_one(partition: &mut Partition, op: BatchOperation) -> DriverResult<ETag> {
    let mut overlay = Overlay::new(&partition.documents);
    let etag = overlay.apply(op)?;
    let staged = overlay.into_staged();
    partition.documents.extend(staged);
    Ok(etag)
}

impl DocumentDriver for MemoryDocumentDriver {
    fn connect(&self, endpoint: &str, master_key: &str) -> DriverResult<()> {
        if let Some(expected) = &self.master_key {
            if expected != master_key {
                return Err(DriverError::Unauthorized);
            }
        }
        *self.endpoint.write() = Some(endpoint.to_string());
        Ok(())
    }

    fn ensure_database(&self, database: &str) -> DriverResult<()> {
        self.check_session()?;
        self.databases.entry(database.to_string()).or_insert(());
        Ok(())
    }

    fn ensure_container(
        &self,
        container: &ContainerRef,
        partition_key_path: &str,
    ) -> DriverResult<()> {
        self.check_session()?;
        if !self.databases.contains_key(&container.database) {
            return Err(DriverError::NotFound(format!(
                "database {}",
                container.database
            )));
        }
        let existing = self
            .containers
            .entry(container.clone())
            .or_insert_with(|| partition_key_path.to_string());
        if existing.value() != partition_key_path {
            return Err(DriverError::Conflict);
        }
        Ok(())
    }

    fn create_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        body: Value,
    ) -> DriverResult<ETag> {
        self.with_partition(container, partition_key, |p| {
            commit_one(p, BatchOperation::Create(body))
        })
    }

    fn read_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        id: &str,
    ) -> DriverResult<Option<StoredDocument>> {
        self.check_container(container)?;
        Ok(self
            .partitions
            .get(&(container.clone(), partition_key.to_string()))
            .and_then(|p| p.documents.get(id).cloned()))
    }

    fn replace_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        body: Value,
        if_match: &ETag,
    ) -> DriverResult<ETag> {
        self.with_partition(container, partition_key, |p| {
            commit_one(
                p,
                BatchOperation::Replace {
                    body,
                    if_match: if_match.clone(),
                },
            )
        })
    }

    fn query_documents(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        query: &DocumentQuery,
    ) -> DriverResult<Vec<StoredDocument>> {
        self.check_container(container)?;
        Ok(self
            .partitions
            .get(&(container.clone(), partition_key.to_string()))
            .map(|p| {
                p.documents
                    .values()
                    .filter(|d| query.matches(&d.body))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn execute_batch(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> DriverResult<Vec<ETag>> {
        self.check_container(container)?;
        if self.take_fault() {
            return Err(DriverError::Unavailable("injected fault".to_string()));
        }
        self.with_partition(container, partition_key, |p| commit(p, operations))
    }
}
