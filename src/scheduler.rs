// src/scheduler.rs
use std::sync::Arc;

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::error::{SyncError, SyncResult};
use crate::job::SyncJob;

/// Accepts 5-field (minute-first) or 6-field (seconds-first) expressions
/// and returns the 6-field form the cron parser wants.
pub fn normalize_cron(expr: &str) -> SyncResult<String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(SyncError::Schedule(format!(
            "cron expression {expr:?} has {n} fields (expected 5 or 6)"
        ))),
    }
}

/// Register `job` under every schedule and start the scheduler.
///
/// Overlapping fires are harmless: the lock and the already-synced check
/// turn them into quick no-ops.
pub async fn start(job: Arc<SyncJob>, schedules: &[String], tz: Tz) -> SyncResult<JobScheduler> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| SyncError::Schedule(format!("creating scheduler: {e:?}")))?;

    for raw in schedules {
        let cron = normalize_cron(raw)?;
        let job = job.clone();
        let cron_job = Job::new_async_tz(cron.as_str(), tz, move |_uuid, _l| {
            let job = job.clone();
            Box::pin(async move {
                info!("scheduled forecast sync triggered");
                if let Err(e) = job.run().await {
                    error!(error = %e, "scheduled forecast sync failed");
                }
            })
        })
        .map_err(|e| SyncError::Schedule(format!("creating job for {raw:?}: {e:?}")))?;

        sched
            .add(cron_job)
            .await
            .map_err(|e| SyncError::Schedule(format!("adding job for {raw:?}: {e:?}")))?;
        info!(schedule = %raw, timezone = %tz.name(), "forecast sync scheduled");
    }

    sched
        .start()
        .await
        .map_err(|e| SyncError::Schedule(format!("starting scheduler: {e:?}")))?;
    Ok(sched)
}
