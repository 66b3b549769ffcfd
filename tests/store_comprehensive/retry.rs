//! Retry Policy Tests
//!
//! A driver wrapper rewrites the version document before every batch, so
//! each commit attempt loses its race. The policy must bound the loop.

use crate::*;
use revstore_storage::document::{BatchOperation, ContainerRef, DocumentDriver, DocumentQuery, StoredDocument};
use revstore_storage::{DriverResult, ETag};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Document driver with a rival writer that always gets there first
struct RivalDriver {
    inner: MemoryDocumentDriver,
    interfering: AtomicBool,
    rival_writes: AtomicU32,
}

impl RivalDriver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryDocumentDriver::new(),
            interfering: AtomicBool::new(false),
            rival_writes: AtomicU32::new(0),
        })
    }

    fn interfere(&self, on: bool) {
        self.interfering.store(on, Ordering::SeqCst);
    }

    fn rival_writes(&self) -> u32 {
        self.rival_writes.load(Ordering::SeqCst)
    }
}

impl DocumentDriver for RivalDriver {
    fn connect(&self, endpoint: &str, master_key: &str) -> DriverResult<()> {
        self.inner.connect(endpoint, master_key)
    }

    fn ensure_database(&self, database: &str) -> DriverResult<()> {
        self.inner.ensure_database(database)
    }

    fn ensure_container(&self, container: &ContainerRef, partition_key_path: &str) -> DriverResult<()> {
        self.inner.ensure_container(container, partition_key_path)
    }

    fn create_document(&self, container: &ContainerRef, partition_key: &str, body: Value) -> DriverResult<ETag> {
        self.inner.create_document(container, partition_key, body)
    }

    fn read_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        id: &str,
    ) -> DriverResult<Option<StoredDocument>> {
        self.inner.read_document(container, partition_key, id)
    }

    fn replace_document(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        body: Value,
        if_match: &ETag,
    ) -> DriverResult<ETag> {
        self.inner.replace_document(container, partition_key, body, if_match)
    }

    fn query_documents(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        query: &DocumentQuery,
    ) -> DriverResult<Vec<StoredDocument>> {
        self.inner.query_documents(container, partition_key, query)
    }

    fn execute_batch(
        &self,
        container: &ContainerRef,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> DriverResult<Vec<ETag>> {
        if self.interfering.load(Ordering::SeqCst) {
            // Same body, fresh ETag
            if let Some(doc) = self.inner.read_document(container, partition_key, partition_key)? {
                self.inner
                    .replace_document(container, partition_key, doc.body, &doc.etag)?;
                self.rival_writes.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.inner.execute_batch(container, partition_key, operations)
    }
}

fn open_rivalled(policy: Option<RetryPolicy>, extra: StoreConfig) -> (Arc<RivalDriver>, Store) {
    let driver = RivalDriver::new();
    let mut builder = Store::builder()
        .config(document_config())
        .config(extra)
        .document_driver(driver.clone());
    if let Some(policy) = policy {
        builder = builder.retry_policy(policy);
    }
    let store = builder.open().unwrap();
    store.add(Entity::new("x", "v1")).unwrap();
    (driver, store)
}

#[test]
fn test_single_attempt_budget() {
    let (driver, store) = open_rivalled(Some(RetryPolicy::immediate(1)), StoreConfig::new());
    driver.interfere(true);

    let err = store
        .append(Entity::new("x", "v2"), ConcurrencyMode::None)
        .unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 1, .. }), "{:?}", err);
    assert!(!err.is_retryable());
    assert_eq!(driver.rival_writes(), 1);
    assert_eq!(store.get_latest_version_number("x").unwrap(), 1);
}

#[test]
fn test_attempt_budget_counts_every_try() {
    let (driver, store) = open_rivalled(Some(RetryPolicy::immediate(5)), StoreConfig::new());
    driver.interfere(true);

    let err = store
        .append(Entity::new("x", "v2"), ConcurrencyMode::None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 5, .. }));
    assert_eq!(driver.rival_writes(), 5);
}

#[test]
fn test_optimistic_lost_race_with_unchanged_version_is_bounded() {
    let (driver, store) = open_rivalled(Some(RetryPolicy::immediate(3)), StoreConfig::new());
    driver.interfere(true);

    let err = store
        .append(Entity::new("x", "v2").with_version(1), ConcurrencyMode::Optimistic)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RetryExhausted);
}

#[test]
fn test_elapsed_deadline_times_out() {
    let policy = RetryPolicy::immediate(u32::MAX).with_deadline(Duration::ZERO);
    let (driver, store) = open_rivalled(Some(policy), StoreConfig::new());
    driver.interfere(true);

    let err = store
        .append(Entity::new("x", "v2"), ConcurrencyMode::None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, StoreError::Timeout { attempts: 1, .. }));
}

#[test]
fn test_deadline_bounds_backoff_loop() {
    let policy = RetryPolicy::default()
        .with_max_attempts(u32::MAX)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(4))
        .with_deadline(Duration::from_millis(30));
    let (driver, store) = open_rivalled(Some(policy), StoreConfig::new());
    driver.interfere(true);

    let err = store
        .append(Entity::new("x", "v2"), ConcurrencyMode::None)
        .unwrap_err();
    match err {
        StoreError::Timeout { elapsed, attempts, .. } => {
            assert!(elapsed >= Duration::from_millis(30));
            assert!(attempts > 1);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_recovers_once_rival_stops() {
    let (driver, store) = open_rivalled(Some(RetryPolicy::immediate(2)), StoreConfig::new());
    driver.interfere(true);
    assert!(store.append(Entity::new("x", "v2"), ConcurrencyMode::None).is_err());

    driver.interfere(false);
    let e = store.append(Entity::new("x", "v2"), ConcurrencyMode::None).unwrap();
    assert_eq!(e.version, 2);
}

#[test]
fn test_policy_read_from_config() {
    let (driver, store) = open_rivalled(None, StoreConfig::new().with(keys::MAX_ATTEMPTS, "3"));
    driver.interfere(true);

    let err = store
        .append(Entity::new("x", "v2"), ConcurrencyMode::None)
        .unwrap_err();
    assert!(matches!(err, StoreError::RetryExhausted { attempts: 3, .. }));
}
