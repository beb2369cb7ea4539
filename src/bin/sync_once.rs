//! Trigger one locked sync run by hand and print the report.

use std::sync::Arc;

use anyhow::Context;
use aq_forecast_sync::{
    build_job, init_tracing,
    store::{ForecastStore, SqliteStore},
    PollType, SyncConfig,
};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "sync_once", about = "Run the forecast sync job once")]
struct Args {
    /// Which files to poll for: forecast, summary or both.
    #[arg(long = "type", default_value = "both")]
    poll_type: PollType,

    /// Poll even if today's data is already stored.
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let cfg = SyncConfig::from_env().context("loading configuration")?;
    let store: Arc<dyn ForecastStore> = Arc::new(
        SqliteStore::open(&cfg.database_path)
            .await
            .with_context(|| format!("opening {}", cfg.database_path.display()))?,
    );
    let job = build_job(&cfg, store).context("building sync job")?;

    let report = job
        .run_with(args.poll_type, args.force)
        .await
        .context("sync run")?;
    println!("{report:?}");
    Ok(())
}
