//! Concurrency layer for revstore
//!
//! This crate turns a backend's conditional write into a safe
//! "assign the next version" operation:
//! - [`VersionLedger`]: the two primitives a backend supplies (read with token, conditional commit)
//! - [`VersionAssigner`]: the compare-and-swap loop run once per append
//! - [`RetryPolicy`]: bounds on that loop (attempts, exponential backoff, deadline)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod protocol;
pub mod retry;

pub use protocol::{CasOutcome, VersionAssigner, VersionLedger, VersionRead};
pub use retry::{RetryDecision, RetryPolicy};
