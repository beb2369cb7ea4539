// src/poller/session.rs
//! Run-scoped polling state: targets, cutoff and alert checkpoints.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::remote::RemoteFile;

pub const FORECAST_FILE_PREFIX: &str = "MetOfficeDefraAQSites";
pub const SUMMARY_FILE_PREFIX: &str = "EMARC_AirQualityForecast";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Forecast,
    Summary,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Forecast => "forecast",
            TargetKind::Summary => "summary",
        })
    }
}

/// Which targets a run polls for. The inactive target starts out done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollType {
    Forecast,
    Summary,
    #[default]
    Both,
}

impl PollType {
    pub fn includes(self, kind: TargetKind) -> bool {
        matches!(
            (self, kind),
            (PollType::Both, _)
                | (PollType::Forecast, TargetKind::Forecast)
                | (PollType::Summary, TargetKind::Summary)
        )
    }

    /// Poll type covering exactly the given needs, or `None` when nothing is needed.
    pub fn from_needs(forecast: bool, summary: bool) -> Option<Self> {
        match (forecast, summary) {
            (true, true) => Some(PollType::Both),
            (true, false) => Some(PollType::Forecast),
            (false, true) => Some(PollType::Summary),
            (false, false) => None,
        }
    }
}

impl FromStr for PollType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forecast" => Ok(PollType::Forecast),
            "summary" => Ok(PollType::Summary),
            "both" => Ok(PollType::Both),
            other => Err(SyncError::Config(format!(
                "unknown poll type {other:?} (expected forecast|summary|both)"
            ))),
        }
    }
}

/// How a target recognises its file in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMatch {
    /// Trimmed name equals the expected file name.
    Exact(String),
    /// Name starts with the prefix and ends in `.txt` (any case).
    PrefixTxt(String),
}

impl FileMatch {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            FileMatch::Exact(expected) => name.trim() == expected.trim(),
            FileMatch::PrefixTxt(prefix) => {
                name.starts_with(prefix.as_str()) && name.to_ascii_lowercase().ends_with(".txt")
            }
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            FileMatch::Exact(s) | FileMatch::PrefixTxt(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollTarget {
    pub kind: TargetKind,
    pub rule: FileMatch,
    done: bool,
}

impl PollTarget {
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The listing entry for this target. When several summary files match,
    /// the lexically greatest name (newest timestamp suffix) wins.
    pub fn find<'a>(&self, listing: &'a [RemoteFile]) -> Option<&'a RemoteFile> {
        listing
            .iter()
            .filter(|f| self.rule.matches(&f.name))
            .max_by(|a, b| a.name.cmp(&b.name))
    }
}

/// Daily polling window in a fixed civil timezone.
#[derive(Debug, Clone)]
pub struct DailyWindow {
    pub timezone: Tz,
    pub cutoff: NaiveTime,
    pub alerts: Vec<NaiveTime>,
}

impl DailyWindow {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            timezone: cfg.timezone,
            cutoff: cfg.cutoff,
            alerts: cfg.alert_times.clone(),
        }
    }
}

impl Default for DailyWindow {
    fn default() -> Self {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
        Self {
            timezone: chrono_tz::Europe::London,
            cutoff: hm(23, 30),
            alerts: vec![hm(10, 0), hm(15, 0)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub at: DateTime<Tz>,
    fired: bool,
}

impl Checkpoint {
    pub fn label(&self) -> String {
        self.at.format("%H:%M").to_string()
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    EndedSuccess,
    EndedTimeout,
}

/// State of one poll run. File names are fixed at session start so a run
/// that crosses midnight keeps looking for the day it started on.
#[derive(Debug, Clone)]
pub struct PollSession {
    run_date: NaiveDate,
    timezone: Tz,
    cutoff: DateTime<Tz>,
    checkpoints: Vec<Checkpoint>,
    forecast: PollTarget,
    summary: PollTarget,
    retry_interval: Duration,
}

impl PollSession {
    pub fn start(
        now: DateTime<Utc>,
        poll_type: PollType,
        window: &DailyWindow,
        retry_interval: Duration,
    ) -> Self {
        let tz = window.timezone;
        let run_date = now.with_timezone(&tz).date_naive();

        let forecast = PollTarget {
            kind: TargetKind::Forecast,
            rule: FileMatch::Exact(expected_forecast_filename(run_date)),
            done: !poll_type.includes(TargetKind::Forecast),
        };
        let summary = PollTarget {
            kind: TargetKind::Summary,
            rule: FileMatch::PrefixTxt(expected_summary_prefix(run_date)),
            done: !poll_type.includes(TargetKind::Summary),
        };

        Self {
            run_date,
            timezone: tz,
            cutoff: local_instant(tz, run_date.and_time(window.cutoff)),
            checkpoints: window
                .alerts
                .iter()
                .map(|t| Checkpoint {
                    at: local_instant(tz, run_date.and_time(*t)),
                    fired: false,
                })
                .collect(),
            forecast,
            summary,
            retry_interval,
        }
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn cutoff(&self) -> DateTime<Tz> {
        self.cutoff
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn target(&self, kind: TargetKind) -> &PollTarget {
        match kind {
            TargetKind::Forecast => &self.forecast,
            TargetKind::Summary => &self.summary,
        }
    }

    pub fn mark_done(&mut self, kind: TargetKind) {
        match kind {
            TargetKind::Forecast => self.forecast.done = true,
            TargetKind::Summary => self.summary.done = true,
        }
    }

    pub fn pending(&self) -> Vec<TargetKind> {
        [&self.forecast, &self.summary]
            .into_iter()
            .filter(|t| !t.done)
            .map(|t| t.kind)
            .collect()
    }

    pub fn all_done(&self) -> bool {
        self.forecast.done && self.summary.done
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.all_done() {
            SessionState::EndedSuccess
        } else if now > self.cutoff {
            SessionState::EndedTimeout
        } else {
            SessionState::Active
        }
    }

    /// Checkpoints reached at `now` that have not fired yet. They are marked
    /// fired, so each one is returned at most once per session.
    pub fn take_due_checkpoints(&mut self, now: DateTime<Utc>) -> Vec<Checkpoint> {
        let mut due = Vec::new();
        for cp in self.checkpoints.iter_mut() {
            if !cp.fired && now >= cp.at {
                cp.fired = true;
                due.push(cp.clone());
            }
        }
        due
    }
}

pub fn expected_forecast_filename(date: NaiveDate) -> String {
    format!("{FORECAST_FILE_PREFIX}_{}.xml", date.format("%Y%m%d"))
}

pub fn expected_summary_prefix(date: NaiveDate) -> String {
    format!("{SUMMARY_FILE_PREFIX}_{}-", date.format("%Y-%m-%d"))
}

/// Resolve a local wall-clock time. Ambiguous times take the earlier
/// instant; times inside a DST gap are pushed forward by an hour.
fn local_instant(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted = naive + chrono::Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn filenames_follow_run_date() {
        let d = NaiveDate::from_ymd_opt(2025, 6, 4).unwrap();
        assert_eq!(expected_forecast_filename(d), "MetOfficeDefraAQSites_20250604.xml");
        assert_eq!(expected_summary_prefix(d), "EMARC_AirQualityForecast_2025-06-04-");
    }

    #[test]
    fn run_date_uses_civil_timezone() {
        // 23:30 UTC on 3 June is 00:30 BST on 4 June.
        let s = PollSession::start(
            utc(2025, 6, 3, 23, 30),
            PollType::Both,
            &DailyWindow::default(),
            Duration::from_secs(60),
        );
        assert_eq!(s.run_date(), NaiveDate::from_ymd_opt(2025, 6, 4).unwrap());
        assert_eq!(s.cutoff().hour(), 23);
        assert_eq!(s.cutoff().minute(), 30);
    }

    #[test]
    fn summary_match_is_prefix_plus_case_insensitive_txt() {
        let rule = FileMatch::PrefixTxt("EMARC_AirQualityForecast_2025-06-04-".into());
        assert!(rule.matches("EMARC_AirQualityForecast_2025-06-04-0412.TXT"));
        assert!(rule.matches("EMARC_AirQualityForecast_2025-06-04-0412.txt"));
        assert!(!rule.matches("EMARC_AirQualityForecast_2025-06-04-0412.pdf"));
        assert!(!rule.matches("EMARC_AirQualityForecast_2025-06-03-0412.TXT"));
    }

    #[test]
    fn forecast_match_is_trimmed_equality() {
        let rule = FileMatch::Exact("MetOfficeDefraAQSites_20250604.xml".into());
        assert!(rule.matches(" MetOfficeDefraAQSites_20250604.xml "));
        assert!(!rule.matches("MetOfficeDefraAQSites_20250604.xml.bak"));
    }

    #[test]
    fn subset_run_starts_other_target_done() {
        let s = PollSession::start(
            utc(2025, 6, 4, 8, 0),
            PollType::Summary,
            &DailyWindow::default(),
            Duration::from_secs(60),
        );
        assert!(s.target(TargetKind::Forecast).is_done());
        assert_eq!(s.pending(), vec![TargetKind::Summary]);
    }

    #[test]
    fn checkpoints_fire_once() {
        let mut s = PollSession::start(
            utc(2025, 6, 4, 7, 0),
            PollType::Both,
            &DailyWindow::default(),
            Duration::from_secs(60),
        );
        // 09:30 BST: nothing due yet.
        assert!(s.take_due_checkpoints(utc(2025, 6, 4, 8, 30)).is_empty());
        // 10:05 BST: first checkpoint.
        let due = s.take_due_checkpoints(utc(2025, 6, 4, 9, 5));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].label(), "10:00");
        assert!(s.take_due_checkpoints(utc(2025, 6, 4, 9, 30)).is_empty());
        // 16:00 BST: second checkpoint only.
        let due = s.take_due_checkpoints(utc(2025, 6, 4, 15, 0));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].label(), "15:00");
    }

    #[test]
    fn state_transitions() {
        let mut s = PollSession::start(
            utc(2025, 6, 4, 7, 0),
            PollType::Both,
            &DailyWindow::default(),
            Duration::from_secs(60),
        );
        assert_eq!(s.state(utc(2025, 6, 4, 7, 0)), SessionState::Active);
        // 23:31 BST
        assert_eq!(s.state(utc(2025, 6, 4, 22, 31)), SessionState::EndedTimeout);
        s.mark_done(TargetKind::Forecast);
        s.mark_done(TargetKind::Summary);
        assert_eq!(s.state(utc(2025, 6, 4, 22, 31)), SessionState::EndedSuccess);
    }

    #[test]
    fn poll_type_parsing() {
        assert_eq!("Forecast".parse::<PollType>().unwrap(), PollType::Forecast);
        assert_eq!(" both ".parse::<PollType>().unwrap(), PollType::Both);
        assert!("all".parse::<PollType>().is_err());
        assert_eq!(PollType::from_needs(false, false), None);
        assert_eq!(PollType::from_needs(true, false), Some(PollType::Forecast));
    }
}
