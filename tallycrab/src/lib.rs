//! # tallycrab
//!
//! Core building blocks for the tallycrab action-counting service.
//!
//! ## Overview
//!
//! tallycrab meters named "actions" reported by registered applications and
//! answers aggregate queries over lookback windows. This crate holds the
//! pieces with real invariants; transports and durable storage live in
//! `tallycrab-server`:
//!
//! - **Admission gating**: at most one admitted request per composite key per
//!   fixed interval
//! - **Credential caching**: a sharded TTL cache for application records
//! - **Time bucketing**: hour buckets and the five fixed summary windows
//! - **Counter keys**: the deterministic row key for one
//!   (application, action, bucket) aggregate
//!
//! ## Quick start
//!
//! ```
//! use tallycrab::{AdmissionGate, TtlCache};
//! use std::time::{Duration, SystemTime};
//!
//! let gate = AdmissionGate::new();
//! let now = SystemTime::now();
//!
//! // One request per key per second
//! assert!(gate.admit(&["10.0.0.1", "create", "a1b2c3d4e5", "click"], now));
//! assert!(!gate.admit(&["10.0.0.1", "create", "a1b2c3d4e5", "click"], now));
//!
//! // Cached credentials expire after a fixed TTL
//! let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
//! cache.insert("a1b2c3d4e5", "token".to_string(), now);
//! assert_eq!(cache.get("a1b2c3d4e5", now), Some("token".to_string()));
//! assert_eq!(cache.get("a1b2c3d4e5", now + Duration::from_secs(61)), None);
//! ```
//!
//! ## Windows and buckets
//!
//! Increments land in hour buckets (UTC); sums are taken over everything
//! strictly newer than a window's start:
//!
//! ```
//! use tallycrab::{Window, bucket_start, counter_key};
//! use chrono::Utc;
//!
//! let now = Utc::now();
//! let bucket = bucket_start(now);
//! assert!(Window::Year.since(now) < Window::Hour.since(now));
//!
//! // Stable for the whole hour
//! let key = counter_key("a1b2c3d4e5", "click", bucket);
//! assert_eq!(key, counter_key("a1b2c3d4e5", "click", bucket));
//! ```
//!
//! ## Feature flags
//!
//! - `ahash` (default): use [ahash](https://crates.io/crates/ahash) for the
//!   gate and cache hash tables

pub mod core;

pub use core::cache::{TtlCache, TtlCacheBuilder};
pub use core::gate::{AdmissionGate, AdmissionGateBuilder};
pub use core::key::counter_key;
pub use core::types::{ActionSummary, App, ServiceStats};
pub use core::window::{Window, bucket_start};
