//! Records shared between server, client, and storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered application: the identity unit being metered
///
/// `id` and `token` are immutable once created. The token is an opaque
/// secret compared byte-for-byte; it is returned exactly once, in the
/// creation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    pub name: String,
    pub token: String,
    /// When set, every request for this app must present the token,
    /// including read-only queries
    pub strict_auth: bool,
    /// Address of the creator, used for the per-address app cap
    pub ip: String,
    pub created_at: DateTime<Utc>,
}

/// Totals for one action over the five fixed windows, all relative to a
/// single captured instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub hour: i64,
    pub day: i64,
    pub week: i64,
    pub month: i64,
    pub year: i64,
}

/// Service-wide totals served by the stats endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub apps: i64,
    pub actions_recorded: i64,
    pub counts_calculated: i64,
    pub summaries_calculated: i64,
}
