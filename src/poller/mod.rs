// src/poller/mod.rs
//! Dual-resource poller.
//!
//! Each attempt opens a fresh remote session, lists the directory once and
//! checks every pending target against that snapshot:
//!
//!   connect -> list -> process targets -> end -> alerts -> sleep -> repeat
//!
//! Connection-layer failures (proxy, SSH, listing, download) are retried
//! after the retry interval. Parse and persistence failures end the run.

pub mod clock;
pub mod session;

use metrics::counter;
use tracing::{error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::forecast::{parse_forecast_xml, parse_summary_txt, summary, SummaryRecord};
use crate::notify::{AlertNotifier, StaleAlert};
use crate::remote::{remote_join, Connector, RemoteFile, RemoteFs};
use crate::store::ForecastStore;

pub use clock::{Clock, ManualClock, SystemClock};
pub use session::{
    expected_forecast_filename, expected_summary_prefix, Checkpoint, DailyWindow, FileMatch,
    PollSession, PollTarget, PollType, SessionState, TargetKind,
};

/// How a poll run ended (other than by error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    TimedOut { pending: Vec<TargetKind> },
}

pub struct Poller<'a> {
    connector: &'a dyn Connector,
    store: &'a dyn ForecastStore,
    clock: &'a dyn Clock,
    notifier: Option<&'a dyn AlertNotifier>,
    remote_dir: &'a str,
}

impl<'a> Poller<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        store: &'a dyn ForecastStore,
        clock: &'a dyn Clock,
        remote_dir: &'a str,
    ) -> Self {
        Self {
            connector,
            store,
            clock,
            notifier: None,
            remote_dir,
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn AlertNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Poll until every active target is done or the cutoff passes.
    pub async fn run(&self, session: &mut PollSession) -> SyncResult<PollOutcome> {
        info!(
            date = %session.run_date(),
            cutoff = %session.cutoff().format("%Y-%m-%d %H:%M:%S %Z"),
            pending = ?session.pending(),
            "polling started"
        );

        loop {
            match session.state(self.clock.now()) {
                SessionState::EndedSuccess => {
                    info!(date = %session.run_date(), "all requested files processed");
                    return Ok(PollOutcome::Completed);
                }
                SessionState::EndedTimeout => {
                    let pending = session.pending();
                    warn!(
                        ?pending,
                        cutoff = %session.cutoff().format("%Y-%m-%d %H:%M:%S %Z"),
                        "polling ended: files not found by cutoff"
                    );
                    return Ok(PollOutcome::TimedOut { pending });
                }
                SessionState::Active => {}
            }

            counter!("forecast_poll_attempts_total").increment(1);
            info!(
                forecast = %session.target(TargetKind::Forecast).rule.pattern(),
                summary = %session.target(TargetKind::Summary).rule.pattern(),
                "connecting to check for files"
            );

            if let Err(e) = self.attempt(session).await {
                if !e.is_transient() {
                    return Err(e);
                }
                counter!("forecast_poll_connect_errors_total").increment(1);
                error!(
                    error = %e,
                    retry_in_secs = session.retry_interval().as_secs(),
                    "error while checking remote server; waiting before next attempt"
                );
            }

            self.fire_due_alerts(session).await;

            if session.all_done() {
                continue;
            }
            info!(
                pending = ?session.pending(),
                retry_in_secs = session.retry_interval().as_secs(),
                "not all files found; retrying later"
            );
            self.clock.sleep(session.retry_interval()).await;
        }
    }

    /// One connect/list/process/end cycle.
    async fn attempt(&self, session: &mut PollSession) -> SyncResult<()> {
        let remote = self.connector.connect().await?;

        let listing = match remote.list(self.remote_dir).await {
            Ok(l) => l,
            Err(e) => {
                teardown(remote).await;
                return Err(e);
            }
        };
        tracing::debug!(entries = listing.len(), dir = %self.remote_dir, "remote listing");

        let result = self.process_targets(session, remote.as_ref(), &listing).await;
        teardown(remote).await;
        result
    }

    /// Targets are independent: a transient fetch failure on one does not
    /// stop the other from being checked. Fatal errors return immediately.
    async fn process_targets(
        &self,
        session: &mut PollSession,
        remote: &dyn RemoteFs,
        listing: &[RemoteFile],
    ) -> SyncResult<()> {
        let mut transient: Option<SyncError> = None;

        for kind in [TargetKind::Forecast, TargetKind::Summary] {
            if session.target(kind).is_done() {
                continue;
            }
            let res = match kind {
                TargetKind::Forecast => self.process_forecast_target(session, remote, listing).await,
                TargetKind::Summary => self.process_summary_target(session, remote, listing).await,
            };
            match res {
                Ok(true) => session.mark_done(kind),
                Ok(false) => {}
                Err(e) if e.is_transient() => {
                    error!(target_kind = %kind, error = %e, "fetching file failed");
                    transient.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        transient.map_or(Ok(()), Err)
    }

    pub async fn process_forecast_target(
        &self,
        session: &PollSession,
        remote: &dyn RemoteFs,
        listing: &[RemoteFile],
    ) -> SyncResult<bool> {
        let target = session.target(TargetKind::Forecast);
        let Some(file) = target.find(listing) else {
            info!(file = %target.rule.pattern(), "forecast file not found");
            return Ok(false);
        };

        info!(file = %file.name, "forecast file found; fetching content");
        let bytes = remote.get(&remote_join(self.remote_dir, &file.name)).await?;

        let records = parse_forecast_xml(&bytes).inspect_err(|e| {
            error!(file = %file.name, error = %e, "forecast file found but could not be parsed");
        })?;
        let written = self.store.upsert_forecasts(&records).await.inspect_err(|e| {
            error!(file = %file.name, error = %e, "forecast upsert failed");
        })?;

        counter!("forecast_artifacts_persisted_total", "target" => "forecast").increment(1);
        info!(file = %file.name, locations = written, "forecasts upserted");
        Ok(true)
    }

    pub async fn process_summary_target(
        &self,
        session: &PollSession,
        remote: &dyn RemoteFs,
        listing: &[RemoteFile],
    ) -> SyncResult<bool> {
        let target = session.target(TargetKind::Summary);
        let Some(file) = target.find(listing) else {
            info!(prefix = %target.rule.pattern(), "summary file not found");
            return Ok(false);
        };

        info!(file = %file.name, "summary file found; fetching content");
        let bytes = remote.get(&remote_join(self.remote_dir, &file.name)).await?;

        let parsed = parse_summary_txt(&bytes).inspect_err(|e| {
            error!(file = %file.name, error = %e, "summary file found but could not be parsed");
        })?;

        let issued_on = parsed.issue_date.as_deref().and_then(summary::issue_date_day);
        if issued_on != Some(session.run_date()) {
            warn!(
                file = %file.name,
                issue_date = ?parsed.issue_date,
                expected = %session.run_date(),
                "summary file is stale; treating as not found"
            );
            return Ok(false);
        }

        let record = SummaryRecord::latest(file.name.clone(), parsed, self.clock.now());
        self.store.replace_summary(&record).await.inspect_err(|e| {
            error!(file = %file.name, error = %e, "summary upsert failed");
        })?;

        counter!("forecast_artifacts_persisted_total", "target" => "summary").increment(1);
        info!(file = %file.name, "latest summary upserted");
        Ok(true)
    }

    async fn fire_due_alerts(&self, session: &mut PollSession) {
        let pending = session.pending();
        if pending.is_empty() {
            return;
        }
        for cp in session.take_due_checkpoints(self.clock.now()) {
            let alert = StaleAlert {
                date: session.run_date(),
                checkpoint: cp.label(),
                timezone: session.timezone().name().to_string(),
                pending: pending.clone(),
            };
            counter!("forecast_poll_alerts_total").increment(1);
            error!(
                checkpoint = %alert.checkpoint,
                pending = ?alert.pending,
                "{}",
                alert.message()
            );
            if let Some(n) = self.notifier {
                if let Err(e) = n.send(&alert).await {
                    warn!(error = ?e, "alert notifier failed");
                }
            }
        }
    }
}

async fn teardown(remote: Box<dyn RemoteFs>) {
    if let Err(e) = remote.end().await {
        warn!(error = %e, "closing remote session failed");
    }
}
