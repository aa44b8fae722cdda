use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tallycrab::ActionSummary;

use crate::error::{ClientError, Result};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default interval between background flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Builder for creating a [`Client`]
pub struct ClientBuilder {
    timeout: Duration,
    flush_interval: Duration,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the interval between background flushes
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Build the client against a server and application
    ///
    /// `base_url` is the server root, e.g. `http://localhost:8080`; a
    /// trailing slash is tolerated. The application id and token come
    /// from registering at `/app/create/{name}`.
    pub fn build(
        self,
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Client> {
        let app_id = app_id.into();
        let token = token.into();
        if app_id.is_empty() || token.is_empty() {
            return Err(ClientError::Config(
                "application id and token must not be empty".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(ClientError::Config(
                "flush interval must not be zero".to_string(),
            ));
        }

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(Client {
            inner: Arc::new(Inner {
                http,
                base_url,
                app_id,
                token,
                pending: Mutex::new(HashMap::new()),
                flush_interval: self.flush_interval,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Buffered client for a tallycrab server
///
/// [`record`](Client::record) is synchronous and only touches an
/// in-process buffer; [`flush`](Client::flush) or the background task
/// from [`spawn_flusher`](Client::spawn_flusher) moves the buffered
/// counts to the server. Cloning is cheap and all clones share the
/// buffer.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    token: String,
    pending: Mutex<HashMap<String, i64>>,
    flush_interval: Duration,
}

impl Client {
    /// Create a new client with default configuration
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        ClientBuilder::new().build(base_url, app_id, token)
    }

    /// Create a new client builder for advanced configuration
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Count `count` occurrences of `action` in the local buffer
    ///
    /// Repeated records of the same action coalesce into one report.
    pub fn record(&self, action: &str, count: i64) {
        let mut pending = self.inner.pending.lock();
        *pending.entry(action.to_string()).or_insert(0) += count;
    }

    /// Send all buffered counts to the server
    ///
    /// On failure the unsent counts go back into the buffer, so the next
    /// flush retries them. Nothing is sent when the buffer is empty.
    pub async fn flush(&self) -> Result<()> {
        let mut pending: Vec<(String, i64)> = {
            let mut buffer = self.inner.pending.lock();
            std::mem::take(&mut *buffer).into_iter().collect()
        };

        while let Some((action, count)) = pending.pop() {
            if let Err(err) = self.send_report(&action, count).await {
                let mut buffer = self.inner.pending.lock();
                *buffer.entry(action).or_insert(0) += count;
                for (action, count) in pending {
                    *buffer.entry(action).or_insert(0) += count;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Flush the buffer on a fixed interval until the task is aborted
    ///
    /// Failed flushes are logged and retried on the next tick. Must be
    /// called from within a tokio runtime.
    pub fn spawn_flusher(&self) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(client.inner.flush_interval);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(err) = client.flush().await {
                    tracing::warn!("report flush failed: {}", err);
                }
            }
        })
    }

    /// Ask the server for the action total over the trailing `lookback`
    pub async fn action_count(&self, action: &str, lookback: Duration) -> Result<i64> {
        let response = self
            .inner
            .http
            .get(self.count_url(action, lookback))
            .header("TOKEN", &self.inner.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<i64>().await?)
    }

    /// Ask the server for the five-window summary of an action
    pub async fn action_summary(&self, action: &str) -> Result<ActionSummary> {
        let response = self
            .inner
            .http
            .get(self.summary_url(action))
            .header("TOKEN", &self.inner.token)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<ActionSummary>().await?)
    }

    async fn send_report(&self, action: &str, count: i64) -> Result<()> {
        let response = self
            .inner
            .http
            .get(self.report_url(action, count))
            .header("TOKEN", &self.inner.token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    fn report_url(&self, action: &str, count: i64) -> String {
        format!(
            "{}/app/{}/action/{}/create?count={}",
            self.inner.base_url, self.inner.app_id, action, count
        )
    }

    fn count_url(&self, action: &str, lookback: Duration) -> String {
        format!(
            "{}/app/{}/action/{}/count/{}s",
            self.inner.base_url,
            self.inner.app_id,
            action,
            lookback.as_secs()
        )
    }

    fn summary_url(&self, action: &str) -> String {
        format!(
            "{}/app/{}/action/{}/summary",
            self.inner.base_url, self.inner.app_id, action
        )
    }

    /// Copy of the pending buffer, for assertions
    #[cfg(test)]
    fn pending_snapshot(&self) -> HashMap<String, i64> {
        self.inner.pending.lock().clone()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    })
}
