//! Retry policy for the version-assignment loop
//!
//! A lost compare-and-swap race is retried with exponential backoff until
//! either the attempt budget or the deadline runs out.
//!
//! ## Configuration keys
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `retry.maxAttempts` | total CAS attempts per append |
//! | `retry.baseBackoffMs` | delay after the first lost race |
//! | `retry.maxBackoffMs` | cap on the doubling delay |
//! | `retry.deadlineMs` | wall-clock budget for one append |

use rand::Rng;
use revstore_core::{Result, StoreConfig, StoreError};
use std::time::Duration;

/// Config key for [`RetryPolicy::max_attempts`]
pub const MAX_ATTEMPTS: &str = "retry.maxAttempts";
/// Config key for [`RetryPolicy::base_backoff`]
pub const BASE_BACKOFF_MS: &str = "retry.baseBackoffMs";
/// Config key for [`RetryPolicy::max_backoff`]
pub const MAX_BACKOFF_MS: &str = "retry.maxBackoffMs";
/// Config key for [`RetryPolicy::deadline`]
pub const DEADLINE_MS: &str = "retry.deadlineMs";

/// First non-zero delay when the schedule starts from a zero base
pub const MIN_BACKOFF_STEP: Duration = Duration::from_millis(1);

/// Bounds on the CAS retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Delay after the first lost race
    pub base_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Wall-clock budget for the whole append
    pub deadline: Option<Duration>,
    /// Randomize each delay within `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(64),
            deadline: None,
            jitter: true,
        }
    }
}

/// What to do after a lost race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the delay, then try again
    Retry(Duration),
    /// Attempt budget spent
    Exhausted,
    /// Deadline elapsed
    DeadlineElapsed,
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            deadline: None,
            jitter: false,
        }
    }

    /// Set the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the backoff schedule
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max.max(base);
        self
    }

    /// Set the wall-clock budget
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Disable jitter
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Read overrides from configuration, starting from the defaults
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let mut policy = RetryPolicy::default();
        if let Some(n) = config.parse::<u32>(MAX_ATTEMPTS)? {
            if n == 0 {
                return Err(StoreError::config(MAX_ATTEMPTS, "must be at least 1"));
            }
            policy.max_attempts = n;
        }
        if let Some(ms) = config.parse::<u64>(BASE_BACKOFF_MS)? {
            policy.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = config.parse::<u64>(MAX_BACKOFF_MS)? {
            policy.max_backoff = Duration::from_millis(ms);
        }
        if policy.max_backoff < policy.base_backoff {
            return Err(StoreError::config(
                MAX_BACKOFF_MS,
                "must not be below retry.baseBackoffMs",
            ));
        }
        if let Some(ms) = config.parse::<u64>(DEADLINE_MS)? {
            policy.deadline = Some(Duration::from_millis(ms));
        }
        Ok(policy)
    }

    /// Un-jittered delay after the given lost attempt (1-based)
    ///
    /// A zero base with a non-zero cap grows from [`MIN_BACKOFF_STEP`].
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let cap = self.max_backoff.max(self.base_backoff);
        let mut backoff = self.base_backoff;
        for _ in 1..attempt {
            let doubled = if backoff.is_zero() {
                MIN_BACKOFF_STEP
            } else {
                backoff.saturating_mul(2)
            };
            backoff = doubled.min(cap);
            if backoff == cap {
                break;
            }
        }
        backoff
    }

    /// Decide what follows the `attempts`-th lost race
    pub fn decide(&self, attempts: u32, elapsed: Duration) -> RetryDecision {
        if attempts >= self.max_attempts.max(1) {
            return RetryDecision::Exhausted;
        }
        let mut delay = self.backoff_for(attempts);
        if let Some(deadline) = self.deadline {
            if elapsed >= deadline {
                return RetryDecision::DeadlineElapsed;
            }
            delay = delay.min(deadline - elapsed);
        }
        if self.jitter {
            delay = jittered(delay);
        }
        RetryDecision::Retry(delay)
    }
}

fn jittered(delay: Duration) -> Duration {
    let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
    if nanos < 2 {
        return delay;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(nanos / 2..=nanos))
}
