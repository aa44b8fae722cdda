//! Simple metrics collection for observability
//!
//! This module provides lightweight metrics collection using atomic counters.
//! Designed for minimal overhead and zero allocations in the hot path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::service::ServiceError;

/// Core metrics collected by the server
pub struct Metrics {
    /// Server start time
    start_time: Instant,

    /// Total API requests received
    pub requests_total: AtomicU64,

    /// Successful operations by kind
    pub apps_created: AtomicU64,
    pub actions_recorded: AtomicU64,
    pub counts_served: AtomicU64,
    pub summaries_served: AtomicU64,

    /// Failure counters
    pub admission_rejections: AtomicU64,
    pub auth_failures: AtomicU64,
    pub storage_errors: AtomicU64,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests_total: AtomicU64::new(0),
            apps_created: AtomicU64::new(0),
            actions_recorded: AtomicU64::new(0),
            counts_served: AtomicU64::new(0),
            summaries_served: AtomicU64::new(0),
            admission_rejections: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            storage_errors: AtomicU64::new(0),
        }
    }

    /// Record an incoming API request
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful application registration
    pub fn record_app_created(&self) {
        self.apps_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully stored action report
    pub fn record_action_recorded(&self) {
        self.actions_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served count query
    pub fn record_count_served(&self) {
        self.counts_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served summary query
    pub fn record_summary_served(&self) {
        self.summaries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed operation under the matching counter
    ///
    /// Client mistakes (bad count, bad lookback, app cap) are visible in
    /// the request total but get no dedicated counter.
    pub fn record_failure(&self, err: &ServiceError) {
        match err {
            ServiceError::RateLimited => {
                self.admission_rejections.fetch_add(1, Ordering::Relaxed);
            }
            ServiceError::Unauthorized => {
                self.auth_failures.fetch_add(1, Ordering::Relaxed);
            }
            ServiceError::Storage(_) => {
                self.storage_errors.fetch_add(1, Ordering::Relaxed);
            }
            ServiceError::AppLimitReached
            | ServiceError::InvalidCount
            | ServiceError::InvalidLookback => {}
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        // Estimate size: ~50 chars per metric line, ~25 lines = ~1250 chars
        let mut output = String::with_capacity(1250);

        // Add header
        output.push_str("# HELP tallycrab_uptime_seconds Time since server start in seconds\n");
        output.push_str("# TYPE tallycrab_uptime_seconds gauge\n");
        output.push_str(&format!(
            "tallycrab_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        // Total requests
        output.push_str("# HELP tallycrab_requests_total Total number of API requests received\n");
        output.push_str("# TYPE tallycrab_requests_total counter\n");
        output.push_str(&format!(
            "tallycrab_requests_total {}\n\n",
            self.requests_total.load(Ordering::Relaxed)
        ));

        // Successful operations by kind
        output.push_str(
            "# HELP tallycrab_operations_completed Successful operations by kind\n",
        );
        output.push_str("# TYPE tallycrab_operations_completed counter\n");
        output.push_str(&format!(
            "tallycrab_operations_completed{{operation=\"create-app\"}} {}\n",
            self.apps_created.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "tallycrab_operations_completed{{operation=\"create-action\"}} {}\n",
            self.actions_recorded.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "tallycrab_operations_completed{{operation=\"action-count\"}} {}\n",
            self.counts_served.load(Ordering::Relaxed)
        ));
        output.push_str(&format!(
            "tallycrab_operations_completed{{operation=\"action-summary\"}} {}\n\n",
            self.summaries_served.load(Ordering::Relaxed)
        ));

        // Failures
        output.push_str(
            "# HELP tallycrab_admission_rejections Requests rejected by the admission gate\n",
        );
        output.push_str("# TYPE tallycrab_admission_rejections counter\n");
        output.push_str(&format!(
            "tallycrab_admission_rejections {}\n\n",
            self.admission_rejections.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP tallycrab_auth_failures Requests rejected for bad credentials\n");
        output.push_str("# TYPE tallycrab_auth_failures counter\n");
        output.push_str(&format!(
            "tallycrab_auth_failures {}\n\n",
            self.auth_failures.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP tallycrab_storage_errors Requests failed by the storage backend\n");
        output.push_str("# TYPE tallycrab_storage_errors counter\n");
        output.push_str(&format!(
            "tallycrab_storage_errors {}\n",
            self.storage_errors.load(Ordering::Relaxed)
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.apps_created.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.admission_rejections.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.storage_errors.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_operations() {
        let metrics = Metrics::new();

        metrics.record_request();
        metrics.record_app_created();
        metrics.record_request();
        metrics.record_action_recorded();
        metrics.record_request();
        metrics.record_count_served();
        metrics.record_request();
        metrics.record_summary_served();

        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.apps_created.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.actions_recorded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.counts_served.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.summaries_served.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_record_failures() {
        let metrics = Metrics::new();

        metrics.record_failure(&ServiceError::RateLimited);
        metrics.record_failure(&ServiceError::Unauthorized);
        metrics.record_failure(&ServiceError::Unauthorized);
        metrics.record_failure(&ServiceError::Storage(anyhow!("boom")));
        // No dedicated counters for client mistakes
        metrics.record_failure(&ServiceError::InvalidCount);
        metrics.record_failure(&ServiceError::AppLimitReached);

        assert_eq!(metrics.admission_rejections.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.auth_failures.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.storage_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();

        metrics.record_request();
        metrics.record_request();
        metrics.record_app_created();
        metrics.record_failure(&ServiceError::RateLimited);

        let output = metrics.export_prometheus();

        assert!(output.contains("tallycrab_uptime_seconds"));
        assert!(output.contains("tallycrab_requests_total 2"));
        assert!(output.contains("tallycrab_operations_completed{operation=\"create-app\"} 1"));
        assert!(output.contains("tallycrab_operations_completed{operation=\"action-count\"} 0"));
        assert!(output.contains("tallycrab_admission_rejections 1"));
        assert!(output.contains("tallycrab_storage_errors 0"));
    }
}
