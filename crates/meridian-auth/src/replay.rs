//! Bounded, time-bucketed replay cache.
//!
//! Entries are grouped into buckets of `bucket_width` by payload timestamp.
//! Buckets that fall entirely behind `now - retention` are dropped. A triple
//! inside the window is never forgotten: once the cache is full, new triples
//! are refused until old buckets age out.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use meridian_types::AccountAddress;

use crate::freshness::ReplayGuard;
use crate::{AuthError, Result};

/// Default hard limit on remembered triples.
pub const DEFAULT_CAPACITY: usize = 65_536;

type ReplayKey = (AccountAddress, String, u64);

#[derive(Debug)]
pub struct ReplayCache {
    bucket_width_ms: u64,
    retention_ms: u64,
    capacity: usize,
    buckets: BTreeMap<u64, HashSet<ReplayKey>>,
    len: usize,
}

impl ReplayCache {
    /// `retention` should equal the freshness skew: anything older is already
    /// rejected as stale.
    pub fn new(bucket_width: Duration, retention: Duration, capacity: usize) -> Self {
        Self {
            bucket_width_ms: (bucket_width.as_millis() as u64).max(1),
            retention_ms: retention.as_millis() as u64,
            capacity: capacity.max(1),
            buckets: BTreeMap::new(),
            len: 0,
        }
    }

    /// A cache with ten buckets across the retention window.
    pub fn with_retention(retention: Duration) -> Self {
        Self::new(retention / 10, retention, DEFAULT_CAPACITY)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Record a triple.
    ///
    /// # Errors
    ///
    /// [`AuthError::ReplayDetected`] if the triple is already present,
    /// [`AuthError::ReplayCacheFull`] if every slot holds a triple that is
    /// still inside the retention window.
    pub fn insert(&mut self, signer: &AccountAddress, type_tag: &str, timestamp: u64, now: u64) -> Result<()> {
        self.prune(now);

        let bucket = timestamp / self.bucket_width_ms;
        let key = (*signer, type_tag.to_string(), timestamp);
        if self.buckets.get(&bucket).is_some_and(|b| b.contains(&key)) {
            return Err(AuthError::ReplayDetected {
                signer: *signer,
                type_tag: key.1,
                timestamp,
            });
        }

        if self.len >= self.capacity {
            tracing::warn!(capacity = self.capacity, buckets = self.buckets.len(), "replay cache full, refusing envelope");
            return Err(AuthError::ReplayCacheFull {
                capacity: self.capacity,
            });
        }

        self.buckets.entry(bucket).or_default().insert(key);
        self.len += 1;
        Ok(())
    }

    /// Drop buckets whose newest possible timestamp is older than the window.
    pub fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.retention_ms);
        while let Some((&bucket, _)) = self.buckets.first_key_value() {
            let bucket_end = bucket.saturating_add(1).saturating_mul(self.bucket_width_ms);
            if bucket_end > cutoff {
                break;
            }
            if let Some(entries) = self.buckets.remove(&bucket) {
                self.len -= entries.len();
            }
        }
    }
}

impl ReplayGuard for Mutex<ReplayCache> {
    fn record_seen(&self, signer: &AccountAddress, type_tag: &str, timestamp: u64, now: u64) -> Result<()> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signer, type_tag, timestamp, now)
    }
}
