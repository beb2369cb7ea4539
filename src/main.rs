//! Forecast sync service: binary entrypoint.
//! Starts the cron-driven sync job and serves the query API on HOST:PORT.

use std::sync::Arc;

use anyhow::Context;
use aq_forecast_sync::{
    api::{self, AppState},
    build_job, init_tracing,
    metrics::Metrics,
    scheduler,
    store::{ForecastStore, SqliteStore},
    SyncConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = SyncConfig::from_env().context("loading configuration")?;
    let metrics = Metrics::init().context("installing metrics recorder")?;

    let store: Arc<dyn ForecastStore> = Arc::new(
        SqliteStore::open(&cfg.database_path)
            .await
            .with_context(|| format!("opening {}", cfg.database_path.display()))?,
    );

    let job = Arc::new(build_job(&cfg, store.clone()).context("building sync job")?);
    let mut sched = scheduler::start(job, &cfg.schedules, cfg.timezone)
        .await
        .context("starting scheduler")?;

    let app = api::router(
        AppState { store },
        cfg.allow_origin_url.as_deref().unwrap_or(""),
    )
    .merge(metrics.router());

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "query API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving query API")?;

    if let Err(e) = sched.shutdown().await {
        tracing::warn!(error = ?e, "scheduler shutdown failed");
    }
    Ok(())
}
