//! Self-reporting of server usage
//!
//! When configured, the server counts its own operations through the
//! regular client crate, pointed at another tallycrab instance or at
//! itself. The [`crate::service::Service::stats`] figures come from these
//! reports.
//!
//! Reports are buffered in the client and flushed in the background, so
//! recording is a cheap in-process increment and never blocks a request.

use anyhow::Result;
use tallycrab_client::Client;

use crate::config::ReportConfig;

/// Buffered usage reporting, possibly disabled
pub struct Reporter {
    client: Option<Client>,
}

impl Reporter {
    /// A reporter that drops everything
    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Build a reporter from the optional self-reporting configuration
    pub fn from_config(config: Option<&ReportConfig>) -> Result<Self> {
        match config {
            None => Ok(Self::disabled()),
            Some(report) => {
                let client = Client::builder().build(
                    report.url.clone(),
                    report.app_id.clone(),
                    report.token.clone(),
                )?;
                Ok(Self {
                    client: Some(client),
                })
            }
        }
    }

    /// Count one occurrence of `action`
    pub fn record(&self, action: &str) {
        if let Some(client) = &self.client {
            client.record(action, 1);
        }
    }

    /// Start the background flusher, if reporting is enabled
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_flusher(&self) {
        if let Some(client) = &self.client {
            client.spawn_flusher();
            tracing::info!("self-reporting enabled");
        }
    }
}
