//! HTTP/JSON API
//!
//! Every endpoint is a GET so a browser address bar or a one-line curl is
//! enough to use the service. Responses are JSON; errors come back as
//! `{"error": "..."}` with a matching status code.
//!
//! # API Endpoints
//!
//! ## GET /app/create/{name}
//!
//! Register an application. `?strict_auth=true` demands the token on
//! reads as well as writes. Returns the application including its token;
//! this is the only time the token is handed out.
//!
//! ```json
//! {
//!   "id": "a1b2c3d4e5",
//!   "name": "my-blog",
//!   "token": "6ff1bed6f1f44e0c8c2e3a9b7d4f5a61",
//!   "strictAuth": false,
//!   "ip": "10.0.0.1",
//!   "createdAt": "2024-06-01T12:00:00Z"
//! }
//! ```
//!
//! ## GET /app/{app_id}/action/{action}/create
//!
//! Record an action. `?count=N` reports N occurrences at once (default 1).
//! Requires the token, passed as `?token=...` or a `TOKEN` header.
//! Returns `null`.
//!
//! ## GET /app/{app_id}/action/{action}/count/{duration}
//!
//! Sum the action over the trailing `duration`, e.g. `90m`, `12h`, `7d`.
//! Requires the token only for strict-auth applications. Returns the sum
//! as a bare number.
//!
//! ## GET /app/{app_id}/action/{action}/summary
//!
//! Sums over five standard windows.
//!
//! ```json
//! {"hour": 5, "day": 80, "week": 312, "month": 1200, "year": 9000}
//! ```
//!
//! ## GET /stats
//!
//! Service-wide usage. No gate, no token.
//!
//! ## GET /health
//!
//! Health check endpoint. Returns "OK" with 200 status.
//!
//! ## GET /metrics
//!
//! Prometheus text format.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tallycrab::{ActionSummary, App, ServiceStats};
use tower_http::services::ServeDir;

use crate::metrics::Metrics;
use crate::service::{Service, ServiceError};

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Count a failure and turn it into a response
    fn failed(&self, err: ServiceError) -> ApiError {
        self.metrics.record_failure(&err);
        ApiError(err)
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error message
    pub error: String,
}

/// A service error on its way out as HTTP
pub struct ApiError(ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::AppLimitReached => StatusCode::FORBIDDEN,
            ServiceError::InvalidCount | ServiceError::InvalidLookback => StatusCode::BAD_REQUEST,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Storage details stay in the log; the response says nothing useful
        let message = match &self.0 {
            ServiceError::Storage(err) => {
                tracing::error!("request failed: {err:#}");
                "internal error".to_string()
            }
            err => err.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Build the router with all API routes
///
/// When `web_dir` is set, anything that matches no API route is served
/// from that directory.
pub fn router(state: AppState, web_dir: Option<&std::path::Path>) -> Router {
    let mut router = Router::new()
        .route("/app/create/{name}", get(handle_create_app))
        .route(
            "/app/{app_id}/action/{action}/create",
            get(handle_create_action),
        )
        .route(
            "/app/{app_id}/action/{action}/count/{duration}",
            get(handle_action_count),
        )
        .route(
            "/app/{app_id}/action/{action}/summary",
            get(handle_action_summary),
        )
        .route("/stats", get(handle_stats))
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(export_metrics));

    if let Some(dir) = web_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router.with_state(state)
}

async fn handle_create_app(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    ClientIp(ip): ClientIp,
) -> Result<Json<App>, ApiError> {
    state.metrics.record_request();
    let strict_auth = query.get("strict_auth").is_some_and(|raw| parse_bool(raw));

    match state.service.create_app(&name, strict_auth, &ip).await {
        Ok(app) => {
            state.metrics.record_app_created();
            Ok(Json(app))
        }
        Err(err) => Err(state.failed(err)),
    }
}

async fn handle_create_action(
    State(state): State<AppState>,
    Path((app_id, action)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ClientIp(ip): ClientIp,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.record_request();
    let token = token_from(&query, &headers);
    let count = match query.get("count") {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| state.failed(ServiceError::InvalidCount))?,
        None => 1,
    };

    match state
        .service
        .record_action(&app_id, &action, count, &token, &ip)
        .await
    {
        Ok(()) => {
            state.metrics.record_action_recorded();
            Ok(Json(serde_json::Value::Null))
        }
        Err(err) => Err(state.failed(err)),
    }
}

async fn handle_action_count(
    State(state): State<AppState>,
    Path((app_id, action, duration)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ClientIp(ip): ClientIp,
) -> Result<Json<i64>, ApiError> {
    state.metrics.record_request();
    let token = token_from(&query, &headers);
    let lookback = humantime::parse_duration(&duration)
        .ok()
        .and_then(|std| chrono::Duration::from_std(std).ok())
        .ok_or_else(|| state.failed(ServiceError::InvalidLookback))?;

    match state
        .service
        .action_count(&app_id, &action, lookback, &token, &ip)
        .await
    {
        Ok(sum) => {
            state.metrics.record_count_served();
            Ok(Json(sum))
        }
        Err(err) => Err(state.failed(err)),
    }
}

async fn handle_action_summary(
    State(state): State<AppState>,
    Path((app_id, action)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ClientIp(ip): ClientIp,
) -> Result<Json<ActionSummary>, ApiError> {
    state.metrics.record_request();
    let token = token_from(&query, &headers);

    match state
        .service
        .action_summary(&app_id, &action, &token, &ip)
        .await
    {
        Ok(summary) => {
            state.metrics.record_summary_served();
            Ok(Json(summary))
        }
        Err(err) => Err(state.failed(err)),
    }
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<ServiceStats>, ApiError> {
    state.metrics.record_request();
    match state.service.stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(err) => Err(state.failed(err)),
    }
}

async fn export_metrics(State(state): State<AppState>) -> String {
    state.metrics.export_prometheus()
}

/// Caller address for gate keys and ownership
///
/// Proxy headers win over the socket peer: `x-real-ip` first, then the
/// first entry of `x-forwarded-for`. Without either, the peer address.
/// "unknown" only happens when the router runs without connect info, as
/// it does under test.
struct ClientIp(String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        if let Some(real_ip) = parts.headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            if !real_ip.is_empty() {
                return Ok(ClientIp(real_ip.to_string()));
            }
        }
        if let Some(forwarded) = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Ok(ClientIp(first.to_string()));
                }
            }
        }
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientIp(ip))
    }
}

/// Token from the `token` query parameter, falling back to the `TOKEN`
/// header, falling back to empty
fn token_from(query: &HashMap<String, String>, headers: &HeaderMap) -> String {
    if let Some(token) = query.get("token") {
        if !token.is_empty() {
            return token.clone();
        }
    }
    headers
        .get("token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The truthy spellings accepted for boolean query parameters
fn parse_bool(raw: &str) -> bool {
    matches!(raw, "1" | "t" | "T" | "true" | "TRUE" | "True")
}
