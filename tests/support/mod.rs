// tests/support/mod.rs
// Scripted fakes shared by the poller and job tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use aq_forecast_sync::lock::{HeldLock, Locker};
use aq_forecast_sync::notify::{AlertNotifier, StaleAlert};
use aq_forecast_sync::forecast::{ForecastRecord, SummaryRecord};
use aq_forecast_sync::remote::{Connector, RemoteFile, RemoteFs};
use aq_forecast_sync::store::{ForecastStore, MemoryStore};
use aq_forecast_sync::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

pub const FORECAST_NAME: &str = "MetOfficeDefraAQSites_20250604.xml";
pub const SUMMARY_NAME: &str = "EMARC_AirQualityForecast_2025-06-04-0412.TXT";

pub const FORECAST_XML: &str = r#"<DEFRAAirQuality>
  <site lc="London Bloomsbury" yr="2025" mon="06" dayn="04" hr="00" lt="51.52" ln="-0.12">
    <day aq="2"/><day aq="3"/>
  </site>
  <site lc="Edinburgh St Leonards" yr="2025" mon="06" dayn="04" hr="00" lt="55.94" ln="-3.18">
    <day aq="1"/>
  </site>
</DEFRAAirQuality>"#;

pub const SUMMARY_TXT: &str = "Issued on Wednesday, 2025-06-04 at 04:12 Local time

Today:
Low air pollution is expected across the UK.

Tomorrow:
Low levels continue.

Outlook:
Mostly low.
";

pub const STALE_SUMMARY_TXT: &str = "Issued on Tuesday, 2025-06-03 at 04:12 Local time

Today:
Yesterday's news.
";

/// 2025-06-04 08:00 Europe/London (BST).
pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 4, 7, 0, 0).unwrap()
}

pub fn utc(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 4, h, m, 0).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub enum ConnectStep {
    Ok,
    ProxyStatus(u16),
    Refused,
}

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub name: String,
    pub content: Vec<u8>,
    /// 1-based connect number from which the file shows up in listings.
    pub visible_from: usize,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub connects: usize,
    pub sessions: usize,
    pub ends: usize,
    pub lists: usize,
    pub gets: Vec<String>,
    pub files: Vec<FakeFile>,
    pub script: VecDeque<ConnectStep>,
    pub fail_list: bool,
}

/// Connector over an in-memory directory. Each connect pops one step from
/// the script (default `Ok`).
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    pub state: Arc<Mutex<FakeState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, name: &str, content: &str, visible_from: usize) -> Self {
        self.state.lock().unwrap().files.push(FakeFile {
            name: name.into(),
            content: content.as_bytes().to_vec(),
            visible_from,
        });
        self
    }

    pub fn with_script(self, steps: &[ConnectStep]) -> Self {
        self.state.lock().unwrap().script.extend(steps.iter().copied());
        self
    }

    pub fn failing_list(self) -> Self {
        self.state.lock().unwrap().fail_list = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn sessions(&self) -> usize {
        self.state.lock().unwrap().sessions
    }

    pub fn ends(&self) -> usize {
        self.state.lock().unwrap().ends
    }

    pub fn gets(&self) -> Vec<String> {
        self.state.lock().unwrap().gets.clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteFs>> {
        let mut st = self.state.lock().unwrap();
        st.connects += 1;
        match st.script.pop_front().unwrap_or(ConnectStep::Ok) {
            ConnectStep::Ok => {}
            ConnectStep::ProxyStatus(status) => {
                return Err(SyncError::ProxyTunnel {
                    status,
                    reason: "Forbidden".into(),
                })
            }
            ConnectStep::Refused => {
                return Err(SyncError::ProxyConnect("connection refused".into()))
            }
        }
        st.sessions += 1;
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            connect_no: st.connects,
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<FakeState>>,
    connect_no: usize,
}

#[async_trait]
impl RemoteFs for FakeSession {
    async fn list(&self, _dir: &str) -> SyncResult<Vec<RemoteFile>> {
        let mut st = self.state.lock().unwrap();
        st.lists += 1;
        if st.fail_list {
            return Err(SyncError::Remote("readdir: connection reset".into()));
        }
        Ok(st
            .files
            .iter()
            .filter(|f| f.visible_from <= self.connect_no)
            .map(|f| RemoteFile::named(f.name.clone()))
            .collect())
    }

    async fn get(&self, path: &str) -> SyncResult<Vec<u8>> {
        let mut st = self.state.lock().unwrap();
        st.gets.push(path.to_string());
        st.files
            .iter()
            .find(|f| path.ends_with(&f.name))
            .map(|f| f.content.clone())
            .ok_or_else(|| SyncError::Remote(format!("no such file: {path}")))
    }

    async fn end(self: Box<Self>) -> SyncResult<()> {
        self.state.lock().unwrap().ends += 1;
        Ok(())
    }
}

/// Connector whose connect panics, as a bug deep in the SSH stack would.
pub struct PanickingConnector;

#[async_trait]
impl Connector for PanickingConnector {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteFs>> {
        panic!("ssh handshake blew up");
    }
}

/// Connector whose connect never finishes.
pub struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(&self) -> SyncResult<Box<dyn RemoteFs>> {
        std::future::pending().await
    }
}

/// Store that delegates to a [`MemoryStore`] but can fail chosen operations.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_upsert: bool,
    pub fail_indexes: bool,
}

impl FailingStore {
    pub fn failing_upsert() -> Self {
        Self {
            fail_upsert: true,
            ..Self::default()
        }
    }

    pub fn failing_indexes() -> Self {
        Self {
            fail_indexes: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ForecastStore for FailingStore {
    async fn ensure_indexes(&self) -> SyncResult<()> {
        if self.fail_indexes {
            return Err(SyncError::Store("createIndex: not authorized".into()));
        }
        self.inner.ensure_indexes().await
    }

    async fn upsert_forecasts(&self, records: &[ForecastRecord]) -> SyncResult<usize> {
        if self.fail_upsert {
            return Err(SyncError::Store("bulk write: disk full".into()));
        }
        self.inner.upsert_forecasts(records).await
    }

    async fn replace_summary(&self, summary: &SummaryRecord) -> SyncResult<()> {
        self.inner.replace_summary(summary).await
    }

    async fn forecasts(&self) -> SyncResult<Vec<ForecastRecord>> {
        self.inner.forecasts().await
    }

    async fn latest_summary(&self) -> SyncResult<Option<SummaryRecord>> {
        self.inner.latest_summary().await
    }

    async fn count_forecasts_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64> {
        self.inner.count_forecasts_updated_between(from, to).await
    }

    async fn count_summaries_updated_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> SyncResult<u64> {
        self.inner.count_summaries_updated_between(from, to).await
    }
}

/// Locker that grants (or refuses) and counts releases.
pub struct CountingLocker {
    grant: bool,
    pub locks: AtomicUsize,
    pub frees: Arc<AtomicUsize>,
}

impl CountingLocker {
    pub fn granting() -> Self {
        Self {
            grant: true,
            locks: AtomicUsize::new(0),
            frees: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn denying() -> Self {
        Self {
            grant: false,
            ..Self::granting()
        }
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Locker for CountingLocker {
    async fn lock(&self, resource: &str) -> SyncResult<Option<Box<dyn HeldLock>>> {
        self.locks.fetch_add(1, Ordering::SeqCst);
        if !self.grant {
            return Ok(None);
        }
        Ok(Some(Box::new(CountedLock {
            resource: resource.to_string(),
            frees: self.frees.clone(),
        })))
    }
}

struct CountedLock {
    resource: String,
    frees: Arc<AtomicUsize>,
}

#[async_trait]
impl HeldLock for CountedLock {
    fn resource(&self) -> &str {
        &self.resource
    }

    async fn free(self: Box<Self>) -> SyncResult<()> {
        self.frees.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Notifier that records every alert it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<StaleAlert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<StaleAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn send(&self, alert: &StaleAlert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
