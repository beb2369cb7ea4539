// src/store/mod.rs
//! Persistence sink for parsed artifacts.
//!
//! Writes are idempotent upserts: forecasts are replaced by `name`, the
//! summary is a single document replaced under `type = "latest"`.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncResult;
use crate::forecast::{ForecastRecord, SummaryRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Ensure the unique index on forecast `name`. Callers treat failure as non-fatal.
    async fn ensure_indexes(&self) -> SyncResult<()>;

    /// Replace-or-insert every record by `name`. Returns the number written.
    async fn upsert_forecasts(&self, records: &[ForecastRecord]) -> SyncResult<usize>;

    /// Replace-or-insert the `type = "latest"` summary.
    async fn replace_summary(&self, summary: &SummaryRecord) -> SyncResult<()>;

    async fn forecasts(&self) -> SyncResult<Vec<ForecastRecord>>;

    async fn latest_summary(&self) -> SyncResult<Option<SummaryRecord>>;

    /// Forecasts whose `updated` lies in `[from, to]`.
    async fn count_forecasts_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64>;

    async fn count_summaries_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64>;
}
