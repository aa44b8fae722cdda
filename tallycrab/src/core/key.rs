//! Deterministic counter row keys
//!
//! Every (application, action, bucket) triple maps to exactly one row in the
//! counter table. The row key is a digest of the triple, so concurrent
//! writers for the same bucket always collide on the same row and the
//! storage layer's upsert can merge them.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Compute the row key for one (application, action, bucket) aggregate
///
/// Lowercase hex SHA-256 over the joined triple, with the bucket taken as
/// unix seconds. Stable across processes and restarts.
pub fn counter_key(app_id: &str, action: &str, bucket: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(app_id.as_bytes());
    hasher.update(b"_");
    hasher.update(action.as_bytes());
    hasher.update(b"_");
    hasher.update(bucket.timestamp().to_string().as_bytes());
    hex::encode(hasher.finalize())
}
