//! Concurrency-control policy for appends

use serde::{Deserialize, Serialize};

/// How an append treats the version the caller presents
///
/// This is a per-call parameter, not store-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// The presented version is ignored; the append always advances the latest version
    None,
    /// The presented version must equal the stored latest version (Optimistic Offline Lock)
    #[default]
    Optimistic,
}

impl ConcurrencyMode {
    /// Whether a stale presented version aborts the append
    pub fn checks_version(&self) -> bool {
        matches!(self, ConcurrencyMode::Optimistic)
    }
}

impl std::fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcurrencyMode::None => write!(f, "none"),
            ConcurrencyMode::Optimistic => write!(f, "optimistic"),
        }
    }
}
