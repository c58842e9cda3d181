//! Freshness policy, clocks and the replay-guard capability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use meridian_types::AccountAddress;

use crate::{AuthError, Result};

/// Source of the current time in unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// What a received envelope must satisfy beyond a valid signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Type tag the envelope must carry.
    pub expected_tag: String,
    /// Oldest acceptable payload age.
    pub max_age: Duration,
    /// How far in the future a payload timestamp may lie.
    pub max_future_skew: Duration,
}

impl FreshnessPolicy {
    /// A policy accepting timestamps within `max_skew` on either side of now.
    pub fn new(expected_tag: impl Into<String>, max_skew: Duration) -> Self {
        Self {
            expected_tag: expected_tag.into(),
            max_age: max_skew,
            max_future_skew: max_skew,
        }
    }

    /// Check a payload timestamp against `now`.
    pub fn check_timestamp(&self, timestamp: u64, now: u64) -> Result<()> {
        let max_age = self.max_age.as_millis() as u64;
        let max_future = self.max_future_skew.as_millis() as u64;
        if timestamp.saturating_add(max_age) < now || timestamp > now.saturating_add(max_future) {
            return Err(AuthError::StaleTimestamp { timestamp, now });
        }
        Ok(())
    }
}

/// Remembers which `(signer, type_tag, timestamp)` triples were accepted.
pub trait ReplayGuard: Send + Sync {
    /// Record a triple.
    ///
    /// Fails with `ReplayDetected` if it was already present, or with
    /// `ReplayCacheFull` if the guard cannot remember it.
    fn record_seen(&self, signer: &AccountAddress, type_tag: &str, timestamp: u64, now: u64) -> Result<()>;
}
