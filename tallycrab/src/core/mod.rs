//! Core components of the tallycrab action-counting service
//!
//! This module contains the fundamental building blocks:
//! - [`gate`]: per-key fixed-interval admission gating
//! - [`cache`]: sharded TTL cache for application records
//! - [`window`]: hour buckets and fixed summary windows
//! - [`key`]: deterministic counter row keys
//! - [`types`]: records shared between server, client, and storage

pub mod cache;
pub mod gate;
pub mod key;
pub mod types;
pub mod window;


pub use cache::{TtlCache, TtlCacheBuilder};
pub use gate::{AdmissionGate, AdmissionGateBuilder};
pub use key::counter_key;
pub use types::{ActionSummary, App, ServiceStats};
pub use window::{Window, bucket_start};
