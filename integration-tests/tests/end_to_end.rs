//! End-to-end tests over a real listener
//!
//! Each test spawns the full server in-process on an ephemeral port and
//! talks to it the way users do: through the client crate or plain HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tallycrab::{AdmissionGate, App, TtlCache};
use tallycrab_client::{Client, ClientError};
use tallycrab_server::http::{self, AppState};
use tallycrab_server::metrics::Metrics;
use tallycrab_server::report::Reporter;
use tallycrab_server::service::Service;
use tallycrab_server::storage::MemoryStorage;

async fn spawn_server(
    admission_interval: Duration,
    max_apps: i64,
    web_dir: Option<PathBuf>,
) -> String {
    let gate = AdmissionGate::builder().interval(admission_interval).build();
    let credentials = TtlCache::new(Duration::from_secs(86_400));
    let service = Arc::new(Service::new(
        Arc::new(MemoryStorage::new()),
        gate,
        credentials,
        Reporter::disabled(),
        max_apps,
    ));
    let metrics = Arc::new(Metrics::new());
    let app = http::router(AppState { service, metrics }, web_dir.as_deref());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("server run");
    });

    format!("http://{addr}")
}

async fn register(base: &str, name: &str) -> App {
    let response = reqwest::get(format!("{base}/app/create/{name}"))
        .await
        .expect("create request");
    assert_eq!(response.status(), 200);
    response.json::<App>().await.expect("application json")
}

#[tokio::test]
async fn test_report_and_query_through_client() {
    let base = spawn_server(Duration::ZERO, 5, None).await;
    let registered = register(&base, "wired").await;

    let client = Client::new(&base, &registered.id, &registered.token).expect("client");

    // Three records coalesce into one report on the wire
    client.record("click", 1);
    client.record("click", 1);
    client.record("click", 1);
    client.flush().await.expect("flush");

    let count = client
        .action_count("click", Duration::from_secs(7200))
        .await
        .expect("count");
    assert_eq!(count, 3);

    let summary = client.action_summary("click").await.expect("summary");
    assert_eq!(summary.day, 3);
    assert_eq!(summary.year, 3);

    // A second flush has nothing left to send, so the count holds
    client.flush().await.expect("second flush");
    let count = client
        .action_count("click", Duration::from_secs(7200))
        .await
        .expect("count after empty flush");
    assert_eq!(count, 3);

    let stats: serde_json::Value = reqwest::get(format!("{base}/stats"))
        .await
        .expect("stats request")
        .json()
        .await
        .expect("stats json");
    assert_eq!(stats["apps"], 1);
}

#[tokio::test]
async fn test_strict_auth_round_trip() {
    let base = spawn_server(Duration::ZERO, 5, None).await;

    let response = reqwest::get(format!("{base}/app/create/guarded?strict_auth=true"))
        .await
        .expect("create request");
    let registered = response.json::<App>().await.expect("application json");
    assert!(registered.strict_auth);

    // Reads without the token are turned away
    let response = reqwest::get(format!(
        "{base}/app/{}/action/click/count/1h",
        registered.id
    ))
    .await
    .expect("count request");
    assert_eq!(response.status(), 401);

    // The client crate passes the token as a header
    let client = Client::new(&base, &registered.id, &registered.token).expect("client");
    let count = client
        .action_count("click", Duration::from_secs(3600))
        .await
        .expect("count with token");
    assert_eq!(count, 0);

    // A wrong token surfaces as the server's 401
    let wrong = Client::new(&base, &registered.id, "not-the-token").expect("client");
    let err = wrong
        .action_count("click", Duration::from_secs(3600))
        .await
        .expect_err("token must be rejected");
    assert!(matches!(
        err,
        ClientError::UnexpectedStatus { status: 401, .. }
    ));
}

#[tokio::test]
async fn test_admission_gate_on_the_wire() {
    let base = spawn_server(Duration::from_secs(60), 5, None).await;
    let registered = register(&base, "gated").await;

    let report = format!(
        "{base}/app/{}/action/click/create?token={}",
        registered.id, registered.token
    );
    let response = reqwest::get(&report).await.expect("first report");
    assert_eq!(response.status(), 200);

    let response = reqwest::get(&report).await.expect("second report");
    assert_eq!(response.status(), 429);
    let body: serde_json::Value = response.json().await.expect("error json");
    assert_eq!(body["error"], "rate limit exceeded (1 request per second)");

    // A different action has its own gate key
    let other = format!(
        "{base}/app/{}/action/view/create?token={}",
        registered.id, registered.token
    );
    let response = reqwest::get(&other).await.expect("other action");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_app_cap_on_the_wire() {
    let base = spawn_server(Duration::ZERO, 1, None).await;
    register(&base, "only").await;

    let response = reqwest::get(format!("{base}/app/create/onetoomany"))
        .await
        .expect("second create");
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_health_metrics_and_static_files() {
    // Put a small site next to the API
    let web_dir = std::env::temp_dir().join(format!("tallycrab-web-{}", std::process::id()));
    std::fs::create_dir_all(&web_dir).expect("web dir");
    std::fs::write(web_dir.join("index.html"), "<h1>tallies</h1>").expect("index file");

    let base = spawn_server(Duration::ZERO, 5, Some(web_dir)).await;

    let response = reqwest::get(format!("{base}/health")).await.expect("health");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.expect("health body"), "OK");

    register(&base, "measured").await;
    let metrics = reqwest::get(format!("{base}/metrics"))
        .await
        .expect("metrics")
        .text()
        .await
        .expect("metrics body");
    assert!(metrics.contains("tallycrab_requests_total 1"));

    // Unmatched paths fall through to the static site
    let page = reqwest::get(format!("{base}/index.html"))
        .await
        .expect("static page");
    assert_eq!(page.status(), 200);
    assert_eq!(page.text().await.expect("page body"), "<h1>tallies</h1>");
}
