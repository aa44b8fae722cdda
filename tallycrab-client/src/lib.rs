//! Buffered reporting client for the tallycrab counting server
//!
//! This crate provides an async client that buffers action counts in
//! process and flushes them to a tallycrab server in the background, so
//! counting something costs a hash map increment rather than an HTTP
//! round trip.
//!
//! # Example
//!
//! ```no_run
//! use tallycrab_client::Client;
//!
//! # async fn example() -> tallycrab_client::Result<()> {
//! let client = Client::new("http://localhost:8080", "a1b2c3d4e5", "secret-token")?;
//! client.spawn_flusher();
//!
//! // Cheap, synchronous, callable from anywhere
//! client.record("page-view", 1);
//!
//! // Queries go straight to the server
//! let views = client
//!     .action_count("page-view", std::time::Duration::from_secs(3600))
//!     .await?;
//! println!("views in the last hour: {views}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{Client, ClientBuilder};
pub use error::{ClientError, Result};
