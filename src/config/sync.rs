// src/config/sync.rs
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::{SyncError, SyncResult};

pub const DEFAULT_SFTP_HOST: &str = "sftp22.sftp-defra-gov-uk.quatrix.it";
pub const DEFAULT_SFTP_PORT: u16 = 22;
pub const DEFAULT_SFTP_USERNAME: &str = "q2031671";
pub const DEFAULT_REMOTE_PATH: &str = "/Incoming Shares/AQIE/MetOffice/";
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_FORECAST_SCHEDULE: &str = "0 05-10 * * *";
pub const DEFAULT_SEED_SCHEDULE: &str = "28 11 * * *";
pub const DEFAULT_TIMEZONE: &str = "Europe/London";
pub const DEFAULT_CUTOFF: &str = "23:30";
pub const DEFAULT_ALERT_TIMES: &str = "10:00,15:00";
pub const DEFAULT_LOCK_TTL_SECS: u64 = 20 * 3600;

/// Process-wide settings, read once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Empty means the remote host is reachable directly.
    pub http_proxy: Option<String>,
    pub sftp_host: String,
    pub sftp_port: u16,
    pub sftp_username: String,
    /// Base64 encoded private key as delivered through the environment.
    pub sftp_private_key_b64: String,
    pub sftp_private_key_file: Option<PathBuf>,
    pub sftp_host_fingerprint: Option<String>,
    pub remote_path: String,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
    pub schedules: Vec<String>,
    pub timezone: Tz,
    pub cutoff: NaiveTime,
    pub alert_times: Vec<NaiveTime>,
    pub database_path: PathBuf,
    pub redis_url: Option<String>,
    pub lock_ttl: Duration,
    pub slack_webhook_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub allow_origin_url: Option<String>,
}

impl SyncConfig {
    /// Build the configuration from environment variables, applying defaults.
    pub fn from_env() -> SyncResult<Self> {
        let timezone = parse_timezone(&env_or("FORECAST_TIMEZONE", DEFAULT_TIMEZONE))?;
        let cutoff = parse_clock_time(&env_or("FORECAST_CUTOFF", DEFAULT_CUTOFF))?;
        let alert_times = parse_alert_times(&env_or("FORECAST_ALERT_TIMES", DEFAULT_ALERT_TIMES))?;

        let schedules = vec![
            env_or("FORECAST_SCHEDULE_OPTION_1", DEFAULT_FORECAST_SCHEDULE),
            env_or("SEED_FORECAST_SCHEDULE", DEFAULT_SEED_SCHEDULE),
        ]
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        Ok(Self {
            http_proxy: env_opt("HTTP_PROXY"),
            sftp_host: env_or("SFTP_HOST", DEFAULT_SFTP_HOST),
            sftp_port: env_parse("SFTP_PORT", DEFAULT_SFTP_PORT)?,
            sftp_username: env_or("SFTP_USERNAME", DEFAULT_SFTP_USERNAME),
            sftp_private_key_b64: env_or("SSH_PRIVATE_KEY", ""),
            sftp_private_key_file: env_opt("SSH_PRIVATE_KEY_FILE").map(PathBuf::from),
            sftp_host_fingerprint: env_opt("SFTP_HOST_FINGERPRINT"),
            remote_path: env_or("SFTP_REMOTE_PATH", DEFAULT_REMOTE_PATH),
            retry_interval: Duration::from_millis(env_positive(
                "FORECAST_RETRY_INTERVAL",
                DEFAULT_RETRY_INTERVAL_MS,
            )?),
            connect_timeout: Duration::from_secs(env_parse("CONNECT_TIMEOUT_SECS", 30u64)?),
            schedules,
            timezone,
            cutoff,
            alert_times,
            database_path: PathBuf::from(env_or("DATABASE_PATH", "forecasts.db")),
            redis_url: env_opt("REDIS_URL"),
            lock_ttl: Duration::from_secs(env_positive("LOCK_TTL_SECS", DEFAULT_LOCK_TTL_SECS)?),
            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 3005u16)?,
            allow_origin_url: env_opt("ACCESS_CONTROL_ALLOW_ORIGIN_URL"),
        })
    }

    /// Resolve the PEM private key: the base64 value wins, the key file is the
    /// fallback for direct/local runs.
    pub fn private_key_pem(&self) -> SyncResult<String> {
        if !self.sftp_private_key_b64.trim().is_empty() {
            return decode_private_key(&self.sftp_private_key_b64);
        }
        match &self.sftp_private_key_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                SyncError::Config(format!("reading private key {}: {e}", path.display()))
            }),
            None => Err(SyncError::Config(
                "neither SSH_PRIVATE_KEY nor SSH_PRIVATE_KEY_FILE is set".into(),
            )),
        }
    }
}

/// Decode base64 key material into its PEM text.
pub fn decode_private_key(b64: &str) -> SyncResult<String> {
    let compact: String = b64.split_whitespace().collect();
    let raw = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SyncError::Config(format!("SSH_PRIVATE_KEY is not valid base64: {e}")))?;
    String::from_utf8(raw)
        .map_err(|_| SyncError::Config("SSH_PRIVATE_KEY does not decode to UTF-8 text".into()))
}

pub fn parse_timezone(s: &str) -> SyncResult<Tz> {
    s.trim()
        .parse::<Tz>()
        .map_err(|e| SyncError::Config(format!("invalid timezone {s:?}: {e}")))
}

/// "HH:MM" (or "HH:MM:SS") local time of day.
pub fn parse_clock_time(s: &str) -> SyncResult<NaiveTime> {
    let t = s.trim();
    NaiveTime::parse_from_str(t, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .map_err(|_| SyncError::Config(format!("invalid time of day {s:?}")))
}

pub fn parse_alert_times(s: &str) -> SyncResult<Vec<NaiveTime>> {
    let mut out = s
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_clock_time)
        .collect::<SyncResult<Vec<_>>>()?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> SyncResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|e| SyncError::Config(format!("{key}={v:?}: {e}"))),
    }
}

/// Like `env_parse`, but zero is rejected.
fn env_positive(key: &str, default: u64) -> SyncResult<u64> {
    match env_parse(key, default)? {
        0 => Err(SyncError::Config(format!("{key} must be greater than zero"))),
        n => Ok(n),
    }
}
