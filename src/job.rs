// src/job.rs
//! Lock-guarded sync job: one scheduled run end to end.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use tracing::{error, info, warn};

use crate::error::SyncResult;
use crate::lock::{LockGuard, Locker, SYNC_LOCK_RESOURCE};
use crate::notify::AlertNotifier;
use crate::poller::{Clock, DailyWindow, PollOutcome, PollSession, PollType, Poller, TargetKind};
use crate::remote::Connector;
use crate::store::ForecastStore;

/// What a job run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Another instance holds the lock; nothing was touched.
    LockDenied,
    /// Every requested target was already written today (UTC).
    AlreadySynced,
    Polled(PollOutcome),
}

impl RunReport {
    fn label(&self) -> &'static str {
        match self {
            RunReport::LockDenied => "lock_denied",
            RunReport::AlreadySynced => "already_synced",
            RunReport::Polled(PollOutcome::Completed) => "completed",
            RunReport::Polled(PollOutcome::TimedOut { .. }) => "timed_out",
        }
    }
}

#[derive(Clone)]
pub struct SyncJob {
    pub connector: Arc<dyn Connector>,
    pub store: Arc<dyn ForecastStore>,
    pub locker: Arc<dyn Locker>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Option<Arc<dyn AlertNotifier>>,
    pub remote_dir: String,
    pub window: DailyWindow,
    pub retry_interval: Duration,
}

impl SyncJob {
    /// Scheduled entry point: both targets, skipping what today already has.
    pub async fn run(&self) -> SyncResult<RunReport> {
        self.run_with(PollType::Both, false).await
    }

    /// Run for `poll_type`. With `force`, targets already written today are
    /// polled again.
    pub async fn run_with(&self, poll_type: PollType, force: bool) -> SyncResult<RunReport> {
        let Some(held) = self.locker.lock(SYNC_LOCK_RESOURCE).await? else {
            error!("Failed to acquire lock for resource - forecasts or summary");
            counter!("forecast_sync_runs_total", "result" => "lock_denied").increment(1);
            return Ok(RunReport::LockDenied);
        };
        let guard = LockGuard::new(held);
        info!(resource = guard.resource(), "lock acquired");

        let result = self.run_locked(poll_type, force).await;
        guard.release().await;

        match &result {
            Ok(report) => {
                counter!("forecast_sync_runs_total", "result" => report.label()).increment(1);
            }
            Err(e) => {
                counter!("forecast_sync_runs_total", "result" => "error").increment(1);
                error!(error = %e, "sync run failed");
            }
        }
        result
    }

    async fn run_locked(&self, poll_type: PollType, force: bool) -> SyncResult<RunReport> {
        if let Err(e) = self.store.ensure_indexes().await {
            warn!(error = %e, "could not ensure forecast indexes; continuing");
        }

        let effective = if force {
            poll_type
        } else {
            match self.remaining(poll_type).await? {
                Some(p) => p,
                None => {
                    info!("forecasts and summary already synced today");
                    return Ok(RunReport::AlreadySynced);
                }
            }
        };

        let mut session = PollSession::start(
            self.clock.now(),
            effective,
            &self.window,
            self.retry_interval,
        );

        let mut poller = Poller::new(
            self.connector.as_ref(),
            self.store.as_ref(),
            self.clock.as_ref(),
            &self.remote_dir,
        );
        if let Some(n) = &self.notifier {
            poller = poller.with_notifier(n.as_ref());
        }

        poller.run(&mut session).await.map(RunReport::Polled)
    }

    /// Requested targets that have no write in the current UTC day.
    async fn remaining(&self, poll_type: PollType) -> SyncResult<Option<PollType>> {
        let (from, to) = utc_day_bounds(self.clock.now());

        let forecast_needed = poll_type.includes(TargetKind::Forecast)
            && self.store.count_forecasts_updated_between(from, to).await? == 0;
        let summary_needed = poll_type.includes(TargetKind::Summary)
            && self.store.count_summaries_updated_between(from, to).await? == 0;

        if !forecast_needed && poll_type.includes(TargetKind::Forecast) {
            info!("forecasts already updated today; skipping");
        }
        if !summary_needed && poll_type.includes(TargetKind::Summary) {
            info!("summary already updated today; skipping");
        }

        Ok(PollType::from_needs(forecast_needed, summary_needed))
    }
}

/// `[00:00:00, 23:59:59.999]` of the UTC day containing `now`.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now);
    let end = start + ChronoDuration::days(1) - ChronoDuration::milliseconds(1);
    (start, end)
}
