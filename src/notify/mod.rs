// src/notify/mod.rs
pub mod slack;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use crate::poller::TargetKind;

pub use slack::SlackNotifier;

/// Raised when a checkpoint passes with artifacts still missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleAlert {
    pub date: NaiveDate,
    /// Checkpoint time of day, "HH:MM".
    pub checkpoint: String,
    pub timezone: String,
    pub pending: Vec<TargetKind>,
}

impl StaleAlert {
    pub fn message(&self) -> String {
        let pending = self
            .pending
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" and ");
        format!(
            "[Alert] {pending} file not uploaded to MetOffice SFTP for {} - Time: {} ({})",
            self.date.format("%Y-%m-%d"),
            self.checkpoint,
            self.timezone
        )
    }
}

/// Extra delivery channel for stale alerts. The poller always logs the
/// alert itself; notifiers are best-effort on top of that.
#[async_trait::async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn send(&self, alert: &StaleAlert) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_pending_targets() {
        let a = StaleAlert {
            date: NaiveDate::from_ymd_opt(2025, 6, 4).unwrap(),
            checkpoint: "10:00".into(),
            timezone: "Europe/London".into(),
            pending: vec![TargetKind::Forecast, TargetKind::Summary],
        };
        assert_eq!(
            a.message(),
            "[Alert] forecast and summary file not uploaded to MetOffice SFTP for 2025-06-04 - Time: 10:00 (Europe/London)"
        );
    }
}
