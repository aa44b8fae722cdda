//! Storage backends for applications and counters
//!
//! This module defines the [`Storage`] trait the service runs against and
//! a factory function to create the configured backend.
//!
//! # Backends
//!
//! ## Memory
//! - In-process hash maps behind mutexes
//! - Everything is lost on restart
//! - Best for: development, tests, throwaway deployments
//!
//! ## Postgres
//! - One row per application, one row per (application, action, hour)
//! - Increments are upserts, so concurrent reports never lose counts
//! - Best for: anything that should survive a restart

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tallycrab::App;

use crate::config::{StoreConfig, StoreKind};

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

/// Persistence operations the service needs
///
/// Counter rows are keyed by (application, action, hour bucket), and
/// [`increment`](Storage::increment) must merge concurrent counts for the
/// same key without losing any. Sums are strict: only buckets newer than
/// `since` are included.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up an application by id
    async fn app(&self, app_id: &str) -> Result<Option<App>>;

    /// Persist a new application
    async fn create_app(&self, app: &App) -> Result<()>;

    /// Count applications created from one address
    async fn apps_owned_by(&self, ip: &str) -> Result<i64>;

    /// Count all registered applications
    async fn total_apps(&self) -> Result<i64>;

    /// Add `count` to the (application, action, bucket) row, creating it on
    /// first use
    async fn increment(
        &self,
        app_id: &str,
        action: &str,
        count: i64,
        bucket: DateTime<Utc>,
    ) -> Result<()>;

    /// Sum an application's action over buckets strictly newer than `since`
    async fn action_sum_since(
        &self,
        app_id: &str,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Sum an action across all applications and all time
    async fn global_action_sum(&self, action: &str) -> Result<i64>;
}

/// Create the storage backend named by the configuration
///
/// # Errors
///
/// Returns an error if the postgres store is selected and the connection
/// or schema setup fails.
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig {
///     kind: StoreKind::Memory,
///     database_url: None,
/// };
/// let storage = build_storage(&config).await?;
/// ```
pub async fn build_storage(config: &StoreConfig) -> Result<Arc<dyn Storage>> {
    match config.kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow!("The postgres store requires a database URL"))?;
            let storage = PostgresStorage::connect(url).await?;
            Ok(Arc::new(storage))
        }
    }
}
