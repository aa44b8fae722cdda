//! # Tallycrab Server
//!
//! A multi-tenant action counting service over HTTP.
//!
//! ## Purpose
//!
//! Tallycrab Server gives small projects a counting backend without running
//! their own analytics stack. Applications register once, receive a token,
//! and report named actions as they happen. The server buckets counts by
//! hour and answers aggregate queries over sliding windows. Instead of
//! wiring a time-series database into every side project, you can:
//!
//! - **Register an application** and get an id and token back in one call
//! - **Report actions** with a single GET request from any language
//! - **Query totals** over an arbitrary lookback or a five-window summary
//! - **Share one deployment** across all your projects
//!
//! ## Use Cases
//!
//! - **Event counting**: page views, signups, clicks, job completions
//! - **Lightweight dashboards**: summary endpoint feeds a static page
//! - **Cross-service tallies**: several services increment the same action
//! - **Self-monitoring**: the server reports its own usage to itself
//!
//! ## Installation
//!
//! ```bash
//! cargo install tallycrab-server
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! tallycrab --help
//!
//! # Start with the in-memory store on port 8080
//! tallycrab --http-port 8080
//!
//! # Back counters with Postgres
//! tallycrab --store postgres --database-url postgres://localhost/tallycrab
//! ```
//!
//! ## Configuration
//!
//! Configure via CLI arguments or environment variables (CLI takes precedence):
//!
//! ```bash
//! # Via CLI
//! tallycrab --http-port 9090 --max-apps-per-ip 10
//!
//! # Via environment variables
//! export TALLYCRAB_HTTP_PORT=9090
//! export TALLYCRAB_MAX_APPS_PER_IP=10
//! tallycrab
//!
//! # List all available environment variables
//! tallycrab --list-env-vars
//! ```
//!
//! ### Key Configuration Options
//!
//! - **Store**: `--store memory|postgres` (postgres needs `--database-url`)
//! - **Port**: `--http-port 8080`
//! - **App cap**: `--max-apps-per-ip 5`
//! - **Credential cache**: `--credential-ttl 86400`
//! - **Log Level**: `--log-level error|warn|info|debug|trace`
//!
//! ## How It Works
//!
//! Every request passes through an admission gate keyed by caller address
//! and route: at most one request per second per key. Authenticated routes
//! resolve credentials through a TTL cache in front of the store, so the
//! hot path for a known application never touches storage. Counts land in
//! hourly buckets with one row per (application, action, hour); reporting
//! the same action twice in an hour updates the row in place.
//!
//! ## Endpoints
//!
//! - `GET /app/create/{name}` registers an application
//! - `GET /app/{id}/action/{action}/create` records an action
//! - `GET /app/{id}/action/{action}/count/{duration}` sums a lookback
//! - `GET /app/{id}/action/{action}/summary` sums five standard windows
//! - `GET /stats` reports service-wide usage
//! - `GET /health`, `GET /metrics` for operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         HTTP (axum)          │
//! └──────────────┬───────────────┘
//!                │
//!          ┌─────▼─────┐
//!          │  Service  │
//!          │ gate ▪ ttl│
//!          │   cache   │
//!          └─────┬─────┘
//!                │
//!       ┌────────┴────────┐
//!       │                 │
//! ┌─────▼─────┐    ┌──────▼──────┐
//! │  Memory   │    │  Postgres   │
//! │  Storage  │    │  Storage    │
//! └───────────┘    └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Counting from the command line
//!
//! ```bash
//! # Register an application
//! curl "http://localhost:8080/app/create/my-blog"
//! # => {"id":"a1b2c3d4e5","name":"my-blog","token":"...","strictAuth":false,...}
//!
//! # Record a page view
//! curl "http://localhost:8080/app/a1b2c3d4e5/action/page-view/create?token=..."
//!
//! # How many views in the last week?
//! curl "http://localhost:8080/app/a1b2c3d4e5/action/page-view/count/7d"
//!
//! # All five windows at once
//! curl "http://localhost:8080/app/a1b2c3d4e5/action/page-view/summary"
//! ```
//!
//! ### Counting from Rust
//!
//! Use the [`tallycrab-client`](https://docs.rs/tallycrab-client) crate for
//! buffered reporting with a background flusher.

pub mod config;
pub mod http;
pub mod metrics;
pub mod report;
pub mod service;
pub mod storage;

#[cfg(test)]
mod http_tests;
