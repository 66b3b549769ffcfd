//! Configuration Tests

use crate::*;

#[test]
fn test_backend_selection() {
    let store = Store::open(StoreConfig::new()).unwrap();
    assert_eq!(store.backend_kind(), BackendKind::InMemory);
    assert_eq!(Store::in_memory().unwrap().backend_kind(), BackendKind::InMemory);
    assert_eq!(Store::open(document_config()).unwrap().backend_kind(), BackendKind::Document);
    assert_eq!(Store::open(table_config()).unwrap().backend_kind(), BackendKind::Table);
}

#[test]
fn test_backend_aliases() {
    for (name, kind) in [
        ("memory", BackendKind::InMemory),
        ("InMemory", BackendKind::InMemory),
        ("cosmosdb", BackendKind::Document),
        ("tablestorage", BackendKind::Table),
    ] {
        let parsed: BackendKind = name.parse().unwrap();
        assert_eq!(parsed, kind, "{}", name);
    }
}

#[test]
fn test_unknown_backend() {
    let err = Store::open(StoreConfig::new().with(keys::BACKEND, "tape")).err().unwrap();
    assert!(matches!(err, StoreError::Config { .. }));
    assert_eq!(err.kind(), ErrorKind::InitError);
}

#[test]
fn test_document_requires_every_key() {
    for missing in [keys::URL, keys::MASTER_KEY, keys::DATABASE, keys::CONTAINER] {
        let config: StoreConfig = document_config()
            .iter()
            .filter(|(k, _)| *k != missing)
            .collect();
        let err = Store::open(config).err().unwrap();
        match err {
            StoreError::Config { key, .. } => assert_eq!(key, missing),
            other => panic!("{}: expected config error, got {:?}", missing, other),
        }
    }
}

#[test]
fn test_empty_value_counts_as_missing() {
    let err = Store::open(document_config().with(keys::DATABASE, ""))
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::Config { .. }));
}

#[test]
fn test_table_requires_account() {
    for missing in [keys::ACCOUNT_NAME, keys::ACCOUNT_KEY] {
        let config: StoreConfig = table_config().iter().filter(|(k, _)| *k != missing).collect();
        let err = Store::open(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InitError, "{}", missing);
    }
}

#[test]
fn test_table_suffix() {
    let driver = Arc::new(MemoryTableDriver::new());
    Store::builder()
        .config(table_config().with(keys::TABLE_NAME_SUFFIX, "ci42"))
        .table_driver(driver.clone())
        .open()
        .unwrap();
    assert!(driver.has_table("eventstoreentitiesci42"));
    assert!(driver.has_table("eventstoreversionci42"));

    let err = Store::open(table_config().with(keys::TABLE_NAME_SUFFIX, "ci_42"))
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::Config { .. }));
}

#[test]
fn test_rejected_credentials() {
    let err = Store::builder()
        .config(document_config())
        .document_driver(Arc::new(MemoryDocumentDriver::with_master_key("other")))
        .open()
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::Init(_)));

    let err = Store::builder()
        .config(table_config())
        .table_driver(Arc::new(MemoryTableDriver::with_account_key("other")))
        .open()
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::Init(_)));
}

#[test]
fn test_invalid_retry_settings() {
    for (key, value) in [
        (keys::MAX_ATTEMPTS, "0"),
        (keys::MAX_ATTEMPTS, "many"),
        (keys::DEADLINE_MS, "-5"),
    ] {
        let err = Store::open(StoreConfig::new().with(key, value)).err().unwrap();
        assert!(matches!(err, StoreError::Config { .. }), "{}={}", key, value);
    }
    let err = Store::open(
        StoreConfig::new()
            .with(keys::BASE_BACKOFF_MS, "50")
            .with(keys::MAX_BACKOFF_MS, "10"),
    )
    .err()
    .unwrap();
    assert!(matches!(err, StoreError::Config { .. }));
}

#[test]
fn test_reinit_keeps_data() {
    test_across_backends(|store| {
        store.add(Entity::new("x", 1)).unwrap();
        store.init(store.config()).unwrap();
        assert_eq!(store.get_latest_version_number("x").unwrap(), 1, "{}", store.backend_kind());
    });
}

#[test]
fn test_config_retained() {
    let store = Store::open(table_config()).unwrap();
    assert_eq!(store.config().get(keys::ACCOUNT_NAME), Some("devaccount"));
}
