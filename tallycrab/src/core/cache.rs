//! Sharded TTL cache for application records
//!
//! A read-through cache sits between request authorization and the durable
//! store: hits answer from memory, misses fall back to storage and the
//! caller re-inserts what it found. The cache itself never touches storage.

use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

use super::gate::{default_shard_count, shard_index};

// Configuration constants
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;

struct Entry<V> {
    value: V,
    expires_at: SystemTime,
}

/// Sharded map of string keys to values with a fixed time-to-live
///
/// Every entry carries an absolute expiry stamped at insert time. Reads past
/// the expiry behave as a miss; the dead entry stays in place until
/// [`purge_expired`](TtlCache::purge_expired) sweeps it. The cache is not
/// authoritative for anything it holds.
///
/// # Example
///
/// ```
/// use tallycrab::TtlCache;
/// use std::time::{Duration, SystemTime};
///
/// let cache: TtlCache<u64> = TtlCache::new(Duration::from_secs(60));
/// let now = SystemTime::now();
///
/// cache.insert("k", 7, now);
/// assert_eq!(cache.get("k", now), Some(7));
/// assert_eq!(cache.get("k", now + Duration::from_secs(60)), None);
/// ```
pub struct TtlCache<V> {
    shards: Vec<Mutex<HashMap<String, Entry<V>>>>,
    ttl: Duration,
}

/// Builder for configuring a [`TtlCache`]
///
/// # Example
///
/// ```
/// use tallycrab::TtlCache;
/// use std::time::Duration;
///
/// let cache: TtlCache<String> = TtlCache::builder()
///     .ttl(Duration::from_secs(3600))
///     .shards(8)
///     .capacity(50_000)
///     .build();
/// ```
pub struct TtlCacheBuilder<V> {
    ttl: Duration,
    shards: usize,
    capacity: usize,
    _value: PhantomData<V>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache with the given time-to-live
    pub fn new(ttl: Duration) -> Self {
        Self::builder().ttl(ttl).build()
    }

    /// Create a new builder for configuring a TtlCache
    pub fn builder() -> TtlCacheBuilder<V> {
        TtlCacheBuilder {
            ttl: DEFAULT_TTL,
            shards: default_shard_count(),
            capacity: DEFAULT_CAPACITY,
            _value: PhantomData,
        }
    }

    fn with_config(ttl: Duration, shard_count: usize, capacity: usize) -> Self {
        let shard_count = shard_count.max(1);
        let per_shard = (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize / shard_count;
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::with_capacity(per_shard)))
            .collect();
        TtlCache { shards, ttl }
    }

    /// The configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry, cloning its value
    ///
    /// Returns `None` for unknown keys and for entries at or past their
    /// expiry. Expired entries are left for [`purge_expired`](Self::purge_expired).
    pub fn get(&self, key: &str, now: SystemTime) -> Option<V> {
        let table = self.lock_shard(key);
        match table.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Insert a value, stamping it with `now` + TTL
    ///
    /// Replaces any previous entry for the key, live or expired.
    pub fn insert(&self, key: &str, value: V, now: SystemTime) {
        let entry = Entry {
            value,
            expires_at: now + self.ttl,
        };
        let mut table = self.lock_shard(key);
        table.insert(key.to_string(), entry);
    }

    /// Remove entries at or past their expiry, returning how many
    ///
    /// Intended to run periodically from a background task.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let mut purged = 0;
        for shard in &self.shards {
            let mut table = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = table.len();
            table.retain(|_, entry| entry.expires_at > now);
            purged += before - table.len();
        }
        purged
    }

    fn lock_shard(&self, key: &str) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        let index = shard_index(key, self.shards.len());
        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> TtlCacheBuilder<V> {
    /// Set the time-to-live applied to every entry (default: 24 hours)
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the number of lock shards (default: 4x available parallelism)
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the expected number of cached keys across all shards
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Build the TtlCache with the configured settings
    pub fn build(self) -> TtlCache<V> {
        TtlCache::with_config(self.ttl, self.shards, self.capacity)
    }
}
