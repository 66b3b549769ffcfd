//! Store configuration
//!
//! Configuration is a flat map of string keys to string values, consumed
//! once at `init`. Backend-specific keys are read by the backend that needs
//! them; unknown keys are ignored.

use crate::error::{Result, StoreError};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Selects the backend variant
pub const BACKEND: &str = "backend";

/// Flat string configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    properties: BTreeMap<String, String>,
}

impl StoreConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, returning the updated configuration
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a property
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Get a property; empty values count as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Get a required property
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| StoreError::config(key, "required property is missing or empty"))
    }

    /// Parse an optional property
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| StoreError::config(key, format!("invalid value '{}': {}", raw, e))),
        }
    }

    /// Backend selected by the `backend` key (in-memory when absent)
    pub fn backend_kind(&self) -> Result<BackendKind> {
        Ok(self.parse::<BackendKind>(BACKEND)?.unwrap_or_default())
    }

    /// Iterate over all properties
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for StoreConfig
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = StoreConfig::new();
        for (k, v) in iter {
            config.set(k, v);
        }
        config
    }
}

/// Backend variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    /// Process-local maps behind one mutex
    #[default]
    InMemory,
    /// Document database with partitioned containers and ETags
    Document,
    /// Table store with partition/row keys and ETags
    Table,
}

impl BackendKind {
    /// Configuration name of the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InMemory => "memory",
            BackendKind::Document => "document",
            BackendKind::Table => "table",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in_memory" => Ok(BackendKind::InMemory),
            "document" | "cosmosdb" => Ok(BackendKind::Document),
            "table" | "tablestorage" => Ok(BackendKind::Table),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
