// src/store/sqlite.rs
//! SQLite-backed store. Records are kept as JSON documents next to the
//! columns used for lookups (`name`, `updated`).
//!
//! All statements run on tokio-rusqlite's background thread.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use super::ForecastStore;
use crate::error::{SyncError, SyncResult};
use crate::forecast::{ForecastRecord, SummaryRecord};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS forecasts (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT NOT NULL,
        updated TEXT NOT NULL,
        doc     TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS forecast_summary (
        kind    TEXT PRIMARY KEY,
        updated TEXT NOT NULL,
        doc     TEXT NOT NULL
    );
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(SyncError::store)?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory().await.map_err(SyncError::store)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> SyncResult<Self> {
        conn.call(|c| {
            c.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(SyncError::store)?;
        Ok(Self { conn })
    }

    async fn count_between(
        &self,
        table: &'static str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64> {
        let (from, to) = (ts(&from), ts(&to));
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE updated >= ?1 AND updated <= ?2");
        let n: i64 = self
            .conn
            .call(move |c| Ok(c.query_row(&sql, params![from, to], |row| row.get(0))?))
            .await
            .map_err(SyncError::store)?;
        Ok(n.max(0) as u64)
    }
}

/// Fixed-width UTC timestamp so that text comparison orders chronologically.
fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl ForecastStore for SqliteStore {
    async fn ensure_indexes(&self) -> SyncResult<()> {
        self.conn
            .call(|c| {
                c.execute_batch(
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_forecasts_name ON forecasts(name);",
                )?;
                Ok(())
            })
            .await
            .map_err(SyncError::store)
    }

    async fn upsert_forecasts(&self, records: &[ForecastRecord]) -> SyncResult<usize> {
        let rows = records
            .iter()
            .map(|r| Ok((r.name.clone(), ts(&r.updated), serde_json::to_string(r)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map_err(SyncError::store)?;
        let n = rows.len();

        self.conn
            .call(move |c| {
                let tx = c.transaction()?;
                {
                    let mut del = tx.prepare("DELETE FROM forecasts WHERE name = ?1")?;
                    let mut ins =
                        tx.prepare("INSERT INTO forecasts (name, updated, doc) VALUES (?1, ?2, ?3)")?;
                    for (name, updated, doc) in &rows {
                        del.execute(params![name])?;
                        ins.execute(params![name, updated, doc])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(SyncError::store)?;
        Ok(n)
    }

    async fn replace_summary(&self, summary: &SummaryRecord) -> SyncResult<()> {
        let kind = summary.kind.clone();
        let updated = ts(&summary.updated);
        let doc = serde_json::to_string(summary).map_err(SyncError::store)?;
        self.conn
            .call(move |c| {
                c.execute(
                    "INSERT OR REPLACE INTO forecast_summary (kind, updated, doc) VALUES (?1, ?2, ?3)",
                    params![kind, updated, doc],
                )?;
                Ok(())
            })
            .await
            .map_err(SyncError::store)
    }

    async fn forecasts(&self) -> SyncResult<Vec<ForecastRecord>> {
        let docs: Vec<String> = self
            .conn
            .call(|c| {
                let mut stmt = c.prepare("SELECT doc FROM forecasts ORDER BY id")?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(SyncError::store)?;
        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(SyncError::store))
            .collect()
    }

    async fn latest_summary(&self) -> SyncResult<Option<SummaryRecord>> {
        let doc: Option<String> = self
            .conn
            .call(|c| {
                Ok(c.query_row(
                    "SELECT doc FROM forecast_summary WHERE kind = ?1",
                    params![crate::forecast::SUMMARY_KEY],
                    |row| row.get(0),
                )
                .optional()?)
            })
            .await
            .map_err(SyncError::store)?;
        doc.map(|d| serde_json::from_str(&d).map_err(SyncError::store))
            .transpose()
    }

    async fn count_forecasts_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64> {
        self.count_between("forecasts", from, to).await
    }

    async fn count_summaries_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64> {
        self.count_between("forecast_summary", from, to).await
    }
}
