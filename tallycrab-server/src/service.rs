//! Application service: admission, authorization and counting
//!
//! Every operation follows the same shape: pass the admission gate, resolve
//! and check credentials, then touch storage. The gate is keyed by caller
//! address plus the operation (and its application and action where there
//! is one), so a caller hammering one action cannot lock themselves out of
//! everything else.
//!
//! Authorization fails closed: an unknown application, a wrong token and a
//! broken store all collapse into the same [`ServiceError::Unauthorized`],
//! and only the log distinguishes them.

use std::sync::Arc;
use std::time::SystemTime;

use chrono::Utc;
use tallycrab::{ActionSummary, AdmissionGate, App, ServiceStats, TtlCache, Window, bucket_start};
use thiserror::Error;
use uuid::Uuid;

use crate::report::Reporter;
use crate::storage::Storage;

/// Action names the server reports about itself
pub const REPORT_CREATE_APP: &str = "create-app";
pub const REPORT_CREATE_ACTION: &str = "create-action";
pub const REPORT_ACTION_COUNT: &str = "action-count";
pub const REPORT_ACTION_SUMMARY: &str = "action-summary";

/// Length of a generated application id
const APP_ID_LEN: usize = 10;

/// Errors surfaced to HTTP handlers
///
/// The display strings are the response bodies, so they stay terse and
/// give an attacker nothing: [`ServiceError::Unauthorized`] covers unknown
/// applications, bad tokens and storage failures alike.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("rate limit exceeded (1 request per second)")]
    RateLimited,
    #[error("invalid token for application")]
    Unauthorized,
    #[error("application limit reached for this address")]
    AppLimitReached,
    #[error("count must be a positive integer")]
    InvalidCount,
    #[error("invalid lookback duration")]
    InvalidLookback,
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Storage(err)
    }
}

/// The counting service behind the HTTP handlers
///
/// Owns the admission gate, the credential cache and a handle to storage.
/// All methods take `&self`; the service is shared across handlers in an
/// [`Arc`].
pub struct Service {
    storage: Arc<dyn Storage>,
    gate: AdmissionGate,
    credentials: TtlCache<App>,
    reporter: Reporter,
    max_apps_per_ip: i64,
}

impl Service {
    pub fn new(
        storage: Arc<dyn Storage>,
        gate: AdmissionGate,
        credentials: TtlCache<App>,
        reporter: Reporter,
        max_apps_per_ip: i64,
    ) -> Self {
        Self {
            storage,
            gate,
            credentials,
            reporter,
            max_apps_per_ip,
        }
    }

    /// Register an application and mint its credentials
    ///
    /// The caller address is recorded as the owner and counts against
    /// `max_apps_per_ip`. The new credentials are seeded into the cache,
    /// so the first report after registration skips the storage lookup.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::RateLimited`] when the address created an
    ///   application too recently
    /// - [`ServiceError::AppLimitReached`] when the address owns too many
    pub async fn create_app(
        &self,
        name: &str,
        strict_auth: bool,
        ip: &str,
    ) -> Result<App, ServiceError> {
        let now = SystemTime::now();
        if !self.gate.admit(&[ip, "create-app"], now) {
            return Err(ServiceError::RateLimited);
        }

        let owned = self.storage.apps_owned_by(ip).await?;
        if owned >= self.max_apps_per_ip {
            return Err(ServiceError::AppLimitReached);
        }

        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(APP_ID_LEN);
        let token = Uuid::new_v4().simple().to_string();

        let app = App {
            id,
            name: name.to_string(),
            token,
            strict_auth,
            ip: ip.to_string(),
            created_at: Utc::now(),
        };
        self.storage.create_app(&app).await?;
        self.credentials.insert(&app.id, app.clone(), now);

        self.reporter.record(REPORT_CREATE_APP);
        Ok(app)
    }

    /// Record `count` occurrences of an action in the current hour bucket
    ///
    /// Writes always require the application token, whether or not the
    /// application demands strict auth.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidCount`] when `count` is less than one
    /// - [`ServiceError::RateLimited`] when this (address, application,
    ///   action) reported too recently
    /// - [`ServiceError::Unauthorized`] when the token does not match
    pub async fn record_action(
        &self,
        app_id: &str,
        action: &str,
        count: i64,
        token: &str,
        ip: &str,
    ) -> Result<(), ServiceError> {
        if count < 1 {
            return Err(ServiceError::InvalidCount);
        }

        let now = SystemTime::now();
        if !self.gate.admit(&[ip, "create", app_id, action], now) {
            return Err(ServiceError::RateLimited);
        }

        if !self.authorize(app_id, token, true).await {
            return Err(ServiceError::Unauthorized);
        }

        let bucket = bucket_start(Utc::now());
        self.storage.increment(app_id, action, count, bucket).await?;

        self.reporter.record(REPORT_CREATE_ACTION);
        Ok(())
    }

    /// Sum an action over buckets strictly newer than `now - lookback`
    ///
    /// Reads only require the token when the application demands strict
    /// auth.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidLookback`] when the lookback reaches
    ///   before representable time
    pub async fn action_count(
        &self,
        app_id: &str,
        action: &str,
        lookback: chrono::Duration,
        token: &str,
        ip: &str,
    ) -> Result<i64, ServiceError> {
        let now = SystemTime::now();
        if !self.gate.admit(&[ip, "count", app_id, action], now) {
            return Err(ServiceError::RateLimited);
        }

        if !self.authorize(app_id, token, false).await {
            return Err(ServiceError::Unauthorized);
        }

        let since = Utc::now()
            .checked_sub_signed(lookback)
            .ok_or(ServiceError::InvalidLookback)?;
        let sum = self.storage.action_sum_since(app_id, action, since).await?;

        self.reporter.record(REPORT_ACTION_COUNT);
        Ok(sum)
    }

    /// Sum an action over the five standard windows
    ///
    /// All five sums share one reference time and run concurrently; the
    /// first storage failure abandons the rest.
    pub async fn action_summary(
        &self,
        app_id: &str,
        action: &str,
        token: &str,
        ip: &str,
    ) -> Result<ActionSummary, ServiceError> {
        let now = SystemTime::now();
        if !self.gate.admit(&[ip, "summary", app_id, action], now) {
            return Err(ServiceError::RateLimited);
        }

        if !self.authorize(app_id, token, false).await {
            return Err(ServiceError::Unauthorized);
        }

        let at = Utc::now();
        let (hour, day, week, month, year) = tokio::try_join!(
            self.storage
                .action_sum_since(app_id, action, Window::Hour.since(at)),
            self.storage
                .action_sum_since(app_id, action, Window::Day.since(at)),
            self.storage
                .action_sum_since(app_id, action, Window::Week.since(at)),
            self.storage
                .action_sum_since(app_id, action, Window::Month.since(at)),
            self.storage
                .action_sum_since(app_id, action, Window::Year.since(at)),
        )?;

        self.reporter.record(REPORT_ACTION_SUMMARY);
        Ok(ActionSummary {
            hour,
            day,
            week,
            month,
            year,
        })
    }

    /// Service-wide usage figures
    ///
    /// The application total comes straight from storage. The other three
    /// are global sums over the self-reported actions, so they stay at
    /// zero unless self-reporting feeds this instance.
    pub async fn stats(&self) -> Result<ServiceStats, ServiceError> {
        let (apps, actions_recorded, counts_calculated, summaries_calculated) = tokio::try_join!(
            self.storage.total_apps(),
            self.storage.global_action_sum(REPORT_CREATE_ACTION),
            self.storage.global_action_sum(REPORT_ACTION_COUNT),
            self.storage.global_action_sum(REPORT_ACTION_SUMMARY),
        )?;

        Ok(ServiceStats {
            apps,
            actions_recorded,
            counts_calculated,
            summaries_calculated,
        })
    }

    /// Drop idle gate entries and expired credentials
    ///
    /// Returns how many of each were removed. Called from the periodic
    /// maintenance task.
    pub fn sweep(&self, now: SystemTime) -> (usize, usize) {
        let gate_retired = self.gate.retire_idle(now);
        let credentials_purged = self.credentials.purge_expired(now);
        (gate_retired, credentials_purged)
    }

    /// Resolve credentials and check the token
    ///
    /// Cache first, storage on a miss. A storage failure is logged and
    /// treated as unknown: the caller gets a plain `false` and the cache
    /// is left untouched, so a recovered store serves the next request.
    /// The token is only compared when the endpoint demands it or the
    /// application opted into strict auth.
    async fn authorize(&self, app_id: &str, token: &str, endpoint_requires_auth: bool) -> bool {
        let now = SystemTime::now();
        let app = match self.credentials.get(app_id, now) {
            Some(app) => app,
            None => match self.storage.app(app_id).await {
                Ok(Some(app)) => {
                    self.credentials.insert(app_id, app.clone(), now);
                    app
                }
                Ok(None) => return false,
                Err(err) => {
                    tracing::error!("credential lookup for {app_id} failed: {err:#}");
                    return false;
                }
            },
        };

        if endpoint_requires_auth || app.strict_auth {
            app.token == token
        } else {
            true
        }
    }
}
