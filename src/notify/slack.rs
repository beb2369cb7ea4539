use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use super::{AlertNotifier, StaleAlert};
use crate::config::SyncConfig;

pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    /// Disabled when `SLACK_WEBHOOK_URL` is unset.
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            webhook_url: cfg.slack_webhook_url.clone(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn new(url: String) -> Self {
        Self {
            webhook_url: Some(url),
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

#[async_trait::async_trait]
impl AlertNotifier for SlackNotifier {
    async fn send(&self, alert: &StaleAlert) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::debug!("Slack disabled (no SLACK_WEBHOOK_URL)");
            return Ok(());
        };

        let body = serde_json::json!({ "text": alert.message() });

        self.client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }
}
