// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod forecast;
pub mod job;
pub mod lock;
pub mod metrics;
pub mod notify;
pub mod poller;
pub mod remote;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::SyncConfig;
pub use crate::error::{SyncError, SyncResult};
pub use crate::job::{RunReport, SyncJob};
pub use crate::poller::{PollOutcome, PollType, TargetKind};

use std::sync::Arc;

use tracing::warn;

use crate::lock::{Locker, MemoryLocker, RedisLocker};
use crate::notify::{AlertNotifier, SlackNotifier};
use crate::poller::{DailyWindow, SystemClock};
use crate::store::ForecastStore;

/// Init tracing: compact text by default, JSON when `LOG_FORMAT=json`.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        eprintln!("tracing subscriber already installed");
    }
}

/// Redis lock when `REDIS_URL` is set, otherwise a process-local lock.
pub fn locker_from_config(cfg: &SyncConfig) -> SyncResult<Arc<dyn Locker>> {
    match &cfg.redis_url {
        Some(url) => Ok(Arc::new(RedisLocker::from_url(url, cfg.lock_ttl)?)),
        None => {
            warn!("REDIS_URL not set; using in-process lock (single instance only)");
            Ok(Arc::new(MemoryLocker::new(cfg.lock_ttl)))
        }
    }
}

/// Wire a production [`SyncJob`] from config and an opened store.
pub fn build_job(cfg: &SyncConfig, store: Arc<dyn ForecastStore>) -> SyncResult<SyncJob> {
    let connector = remote::connector_from_config(cfg)?;
    let slack = SlackNotifier::from_config(cfg);
    let notifier = slack
        .is_enabled()
        .then(|| Arc::new(slack) as Arc<dyn AlertNotifier>);

    Ok(SyncJob {
        connector: Arc::from(connector),
        store,
        locker: locker_from_config(cfg)?,
        clock: Arc::new(SystemClock),
        notifier,
        remote_dir: cfg.remote_path.clone(),
        window: DailyWindow::from_config(cfg),
        retry_interval: cfg.retry_interval,
    })
}
