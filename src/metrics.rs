use axum::{routing::get, Router};
use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{SyncError, SyncResult};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the sync counters.
    pub fn init() -> SyncResult<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| SyncError::Config(format!("prometheus: install recorder: {e}")))?;

        describe();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(
        "forecast_poll_attempts_total",
        Unit::Count,
        "Connect/list/fetch attempts made by the poller"
    );
    describe_counter!(
        "forecast_poll_connect_errors_total",
        Unit::Count,
        "Attempts that failed at the connection layer and were retried"
    );
    describe_counter!(
        "forecast_artifacts_persisted_total",
        Unit::Count,
        "Artifacts parsed and written, labelled by target"
    );
    describe_counter!(
        "forecast_poll_alerts_total",
        Unit::Count,
        "Stale-file checkpoint alerts raised"
    );
    describe_counter!(
        "forecast_sync_runs_total",
        Unit::Count,
        "Sync job runs, labelled by result"
    );
}
