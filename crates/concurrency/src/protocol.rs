//! Version-assignment protocol
//!
//! Turns a backend's conditional write into "store the next revision":
//!
//! ```text
//! 1. read version record -> (current, token)
//! 2. IF absent: EntityNotFound
//! 3. IF optimistic AND presented != current: VersionConflict (no write)
//! 4. next = current + 1
//! 5. conditional commit of `next` guarded by token
//! 6. IF lost race:
//!      optimistic: re-read; presented != current -> VersionConflict
//!      otherwise: consult RetryPolicy, back off, goto 1
//! 7. return revision at `next`
//! ```
//!
//! Only a lost race (token mismatch) is retried. Any other backend error
//! aborts the append immediately.
//!
//! No version state is cached between calls: every attempt re-reads the
//! record from the backend, so several processes can share one store.

use crate::retry::{RetryDecision, RetryPolicy};
use revstore_core::{ConcurrencyMode, Entity, Result, StoreError, Version};
use std::time::Instant;

/// A version record as read from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRead<T> {
    /// Latest version of the entity
    pub version: Version,
    /// Backend-native proof that the record has not changed since this read
    pub token: T,
}

/// Result of a conditional commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// Version record advanced and revision stored
    Committed,
    /// Another writer modified the record since it was read
    Lost,
}

/// The two primitives a backend supplies to the protocol
pub trait VersionLedger {
    /// Optimistic-write token (an ETag or equivalent)
    type Token;

    /// Read the version record of `id`, `None` if the entity was never added
    fn read_version(&self, id: &str) -> Result<Option<VersionRead<Self::Token>>>;

    /// Advance the version record to `revision.version` if it still matches
    /// `token`, and store `revision`.
    ///
    /// Returns [`CasOutcome::Lost`] only when the token no longer matches.
    /// Backends with atomic multi-item writes store the revision in the same
    /// batch; others store it after the advance and report a failure of that
    /// second write as an error.
    fn try_commit(&self, revision: &Entity, token: &Self::Token) -> Result<CasOutcome>;
}

/// Runs the compare-and-swap loop for one append
#[derive(Debug, Clone, Default)]
pub struct VersionAssigner {
    policy: RetryPolicy,
}

impl VersionAssigner {
    /// Create an assigner bounded by `policy`
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Assign the next version to `entity` and store it through `ledger`
    ///
    /// Returns the stored revision, whose `version` is the assigned version.
    pub fn append<L>(&self, ledger: &L, entity: Entity, mode: ConcurrencyMode) -> Result<Entity>
    where
        L: VersionLedger + ?Sized,
    {
        entity.validate()?;
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let current = self.read_existing(ledger, &entity.id)?;
            check_presented(&entity, mode, current.version)?;

            let next = current
                .version
                .checked_add(1)
                .ok_or_else(|| StoreError::internal("append", &entity.id, "version overflow"))?;
            let revision = entity.at_version(next);

            match ledger.try_commit(&revision, &current.token)? {
                CasOutcome::Committed => {
                    tracing::debug!(
                        id = %revision.id,
                        version = next,
                        attempts,
                        mode = %mode,
                        "revision appended"
                    );
                    return Ok(revision);
                }
                CasOutcome::Lost => {
                    if mode.checks_version() {
                        // A concurrent writer won; it almost always moved the version
                        let now = self.read_existing(ledger, &entity.id)?;
                        check_presented(&entity, mode, now.version)?;
                    }

                    match self.policy.decide(attempts, started.elapsed()) {
                        RetryDecision::Retry(delay) => {
                            tracing::debug!(
                                id = %entity.id,
                                attempt = attempts,
                                backoff_us = delay.as_micros() as u64,
                                "lost version race, retrying"
                            );
                            if !delay.is_zero() {
                                std::thread::sleep(delay);
                            }
                        }
                        RetryDecision::Exhausted => {
                            tracing::warn!(id = %entity.id, attempts, "version race retries exhausted");
                            return Err(StoreError::RetryExhausted {
                                id: entity.id,
                                attempts,
                            });
                        }
                        RetryDecision::DeadlineElapsed => {
                            let elapsed = started.elapsed();
                            tracing::warn!(
                                id = %entity.id,
                                attempts,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "version race deadline elapsed"
                            );
                            return Err(StoreError::Timeout {
                                id: entity.id,
                                attempts,
                                elapsed,
                            });
                        }
                    }
                }
            }
        }
    }

    fn read_existing<L>(&self, ledger: &L, id: &str) -> Result<VersionRead<L::Token>>
    where
        L: VersionLedger + ?Sized,
    {
        ledger
            .read_version(id)?
            .ok_or_else(|| StoreError::EntityNotFound { id: id.to_string() })
    }
}

fn check_presented(entity: &Entity, mode: ConcurrencyMode, current: Version) -> Result<()> {
    if mode.checks_version() && entity.version != current {
        return Err(StoreError::VersionConflict {
            id: entity.id.clone(),
            expected: entity.version,
            actual: current,
        });
    }
    Ok(())
}
