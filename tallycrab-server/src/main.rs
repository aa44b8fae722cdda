use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use tallycrab::{AdmissionGate, TtlCache};
use tallycrab_server::config::Config;
use tallycrab_server::http::{self, AppState};
use tallycrab_server::metrics::Metrics;
use tallycrab_server::report::Reporter;
use tallycrab_server::service::Service;
use tallycrab_server::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tallycrab={}", config.log_level).parse()?),
        )
        .init();

    // Storage backend
    let storage = storage::build_storage(&config.store).await?;

    // Admission gate and credential cache
    let gate = AdmissionGate::builder()
        .interval(config.limits.admission_interval)
        .capacity(config.limits.gate_capacity)
        .build();
    let credentials = TtlCache::builder()
        .ttl(config.cache.ttl)
        .capacity(config.cache.capacity)
        .build();

    // Self-reporting through the client crate
    let reporter = Reporter::from_config(config.report.as_ref())?;
    reporter.start_flusher();

    let service = Arc::new(Service::new(
        storage,
        gate,
        credentials,
        reporter,
        config.limits.max_apps_per_ip,
    ));
    let metrics = Arc::new(Metrics::new());

    // Periodic maintenance: retire idle gate entries, purge expired credentials
    let sweeper = Arc::clone(&service);
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        // The first tick completes immediately; skip it so sweeps start
        // one full interval after boot
        interval.tick().await;
        loop {
            interval.tick().await;
            let (gate_retired, credentials_purged) = sweeper.sweep(SystemTime::now());
            tracing::debug!(
                "sweep retired {} gate entries, purged {} credentials",
                gate_retired,
                credentials_purged
            );
        }
    });

    let state = AppState { service, metrics };
    let app = http::router(state, config.web_dir.as_deref());

    if let Some(dir) = &config.web_dir {
        tracing::info!("serving static files from {}", dir.display());
    }
    tracing::info!(
        "Tallycrab server started with store: {:?}, max apps per address: {}",
        config.store.kind,
        config.limits.max_apps_per_ip
    );

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
