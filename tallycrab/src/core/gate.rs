//! Per-key fixed-interval admission gating
//!
//! The gate answers one question: may this caller run this operation right
//! now? Keys are composed from the caller address plus route discriminators,
//! and each distinct key gets its own independent interval.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;

/// Separator between the parts of a composite gate key
const KEY_SEPARATOR: &str = "_";

/// Admission gate enforcing at most one admitted request per key per interval
///
/// The timestamp table is sharded by key hash, so concurrent requests only
/// contend when they land on the same shard. Racing requests on one key
/// serialize on that shard's lock: exactly one of them is admitted within
/// an interval.
///
/// # Example
///
/// ```
/// use tallycrab::AdmissionGate;
/// use std::time::SystemTime;
///
/// let gate = AdmissionGate::new();
/// let now = SystemTime::now();
///
/// assert!(gate.admit(&["10.0.0.1", "create-app"], now));
/// // Same key within the interval: rejected
/// assert!(!gate.admit(&["10.0.0.1", "create-app"], now));
/// // Different key: independent gate
/// assert!(gate.admit(&["10.0.0.2", "create-app"], now));
/// ```
pub struct AdmissionGate {
    shards: Vec<Mutex<HashMap<String, SystemTime>>>,
    interval: Duration,
}

/// Builder for configuring an [`AdmissionGate`]
///
/// # Example
///
/// ```
/// use tallycrab::AdmissionGate;
/// use std::time::Duration;
///
/// let gate = AdmissionGate::builder()
///     .interval(Duration::from_millis(500))
///     .shards(8)
///     .capacity(100_000)
///     .build();
/// ```
pub struct AdmissionGateBuilder {
    interval: Duration,
    shards: usize,
    capacity: usize,
}

impl AdmissionGate {
    /// Create a gate with the default one-second interval
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder for configuring an AdmissionGate
    pub fn builder() -> AdmissionGateBuilder {
        AdmissionGateBuilder {
            interval: DEFAULT_INTERVAL,
            shards: default_shard_count(),
            capacity: DEFAULT_CAPACITY,
        }
    }

    fn with_config(interval: Duration, shard_count: usize, capacity: usize) -> Self {
        let shard_count = shard_count.max(1);
        // Pre-allocate with overhead to avoid rehashing
        let per_shard = (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize / shard_count;
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::with_capacity(per_shard)))
            .collect();
        AdmissionGate { shards, interval }
    }

    /// The configured admission interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide whether the request identified by `parts` may proceed
    ///
    /// `parts` are joined into one key: caller address first, then any route
    /// discriminators in the order supplied. If the key was admitted less
    /// than one interval before `now`, the request is rejected and the table
    /// is left untouched. Otherwise `now` is recorded and the request is
    /// admitted.
    ///
    /// This operation cannot fail, only reject.
    pub fn admit(&self, parts: &[&str], now: SystemTime) -> bool {
        let key = parts.join(KEY_SEPARATOR);
        let mut table = self.lock_shard(&key);
        if let Some(last) = table.get(&key) {
            if *last + self.interval > now {
                return false;
            }
        }
        table.insert(key, now);
        true
    }

    /// Drop entries idle for at least one interval, returning how many
    ///
    /// A retired entry would have admitted its next request anyway, so
    /// admission outcomes are identical to a table that never forgets.
    /// Intended to run periodically from a background task.
    pub fn retire_idle(&self, now: SystemTime) -> usize {
        let mut retired = 0;
        for shard in &self.shards {
            let mut table = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = table.len();
            table.retain(|_, last| *last + self.interval > now);
            retired += before - table.len();
        }
        retired
    }

    fn lock_shard(&self, key: &str) -> MutexGuard<'_, HashMap<String, SystemTime>> {
        let index = shard_index(key, self.shards.len());
        // A panic inside the critical section cannot leave the map torn;
        // a poisoned shard still holds a usable table.
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

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGateBuilder {
    /// Set the admission interval (default: 1 second)
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the number of lock shards (default: 4x available parallelism)
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the expected number of tracked keys across all shards
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Build the AdmissionGate with the configured settings
    pub fn build(self) -> AdmissionGate {
        AdmissionGate::with_config(self.interval, self.shards, self.capacity)
    }
}

pub(crate) fn shard_index(key: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count
}

pub(crate) fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 4)
        .unwrap_or(16)
}
