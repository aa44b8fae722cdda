//! In-memory storage backend
//!
//! Applications and counter rows live in hash maps behind mutexes. The
//! layout mirrors the postgres schema so the two backends stay
//! interchangeable: one counter row per (application, action, hour bucket),
//! keyed by the same digest the postgres table uses as its primary key.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tallycrab::{App, counter_key};

use super::Storage;

/// Storage backend that keeps everything in process memory
pub struct MemoryStorage {
    apps: Mutex<HashMap<String, App>>,
    counters: Mutex<HashMap<String, CounterRow>>,
}

/// One (application, action, hour bucket) row
struct CounterRow {
    app_id: String,
    action: String,
    count: i64,
    bucket: DateTime<Utc>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            apps: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Number of counter rows currently stored
    #[cfg(test)]
    pub fn counter_rows(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn app(&self, app_id: &str) -> Result<Option<App>> {
        let apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(apps.get(app_id).cloned())
    }

    async fn create_app(&self, app: &App) -> Result<()> {
        let mut apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        if apps.contains_key(&app.id) {
            return Err(anyhow!("application {} already exists", app.id));
        }
        apps.insert(app.id.clone(), app.clone());
        Ok(())
    }

    async fn apps_owned_by(&self, ip: &str) -> Result<i64> {
        let apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(apps.values().filter(|app| app.ip == ip).count() as i64)
    }

    async fn total_apps(&self) -> Result<i64> {
        let apps = self.apps.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(apps.len() as i64)
    }

    async fn increment(
        &self,
        app_id: &str,
        action: &str,
        count: i64,
        bucket: DateTime<Utc>,
    ) -> Result<()> {
        let key = counter_key(app_id, action, bucket);
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .entry(key)
            .and_modify(|row| row.count += count)
            .or_insert_with(|| CounterRow {
                app_id: app_id.to_string(),
                action: action.to_string(),
                count,
                bucket,
            });
        Ok(())
    }

    async fn action_sum_since(
        &self,
        app_id: &str,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(counters
            .values()
            .filter(|row| row.app_id == app_id && row.action == action && row.bucket > since)
            .map(|row| row.count)
            .sum())
    }

    async fn global_action_sum(&self, action: &str) -> Result<i64> {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(counters
            .values()
            .filter(|row| row.action == action)
            .map(|row| row.count)
            .sum())
    }
}
