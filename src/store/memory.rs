// src/store/memory.rs
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ForecastStore;
use crate::error::{SyncError, SyncResult};
use crate::forecast::{ForecastRecord, SummaryRecord};

#[derive(Debug, Default)]
struct Inner {
    forecasts: Vec<ForecastRecord>,
    summary: Option<SummaryRecord>,
    writes: usize,
}

/// In-process store for tests and local runs without a database file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write calls (`upsert_forecasts` + `replace_summary`) so far.
    pub fn write_calls(&self) -> usize {
        self.inner.lock().map(|g| g.writes).unwrap_or_default()
    }

    fn guard(&self) -> SyncResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| SyncError::Store("memory store mutex poisoned".into()))
    }
}

#[async_trait]
impl ForecastStore for MemoryStore {
    async fn ensure_indexes(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn upsert_forecasts(&self, records: &[ForecastRecord]) -> SyncResult<usize> {
        let mut g = self.guard()?;
        g.writes += 1;
        for rec in records {
            match g.forecasts.iter_mut().find(|f| f.name == rec.name) {
                Some(slot) => *slot = rec.clone(),
                None => g.forecasts.push(rec.clone()),
            }
        }
        Ok(records.len())
    }

    async fn replace_summary(&self, summary: &SummaryRecord) -> SyncResult<()> {
        let mut g = self.guard()?;
        g.writes += 1;
        g.summary = Some(summary.clone());
        Ok(())
    }

    async fn forecasts(&self) -> SyncResult<Vec<ForecastRecord>> {
        Ok(self.guard()?.forecasts.clone())
    }

    async fn latest_summary(&self) -> SyncResult<Option<SummaryRecord>> {
        Ok(self.guard()?.summary.clone())
    }

    async fn count_forecasts_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64> {
        let g = self.guard()?;
        Ok(g.forecasts
            .iter()
            .filter(|f| f.updated >= from && f.updated <= to)
            .count() as u64)
    }

    async fn count_summaries_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64> {
        let g = self.guard()?;
        Ok(g.summary
            .iter()
            .filter(|s| s.updated >= from && s.updated <= to)
            .count() as u64)
    }
}
