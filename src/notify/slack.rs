use anyhow::{anyhow, Result};
use reqwest::Client;
use std::time::Duration;

use super::{FailureNotice, Notifier};

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl SlackNotifier {
    pub fn from_env() -> Option<Self> {
        match std::env::var("SLACK_WEBHOOK_URL") {
            Ok(url) if !url.trim().is_empty() => Some(Self::new(url)),
            _ => {
                tracing::debug!(target: "notify", "Slack disabled (no SLACK_WEBHOOK_URL)");
                None
            }
        }
    }

    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, notice: &FailureNotice) -> Result<()> {
        let text = format!(
            "*{}*\n{}\n@ {}",
            notice.subject(),
            notice.error,
            notice.ts.to_rfc3339()
        );
        let body = serde_json::json!({ "text": text });

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook_url)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await
                .and_then(|rsp| rsp.error_for_status());

            match res {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    tracing::debug!(target: "notify", attempt, error = ?e, "slack retry");
                    tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                }
                Err(e) => return Err(anyhow!("Slack webhook failed: {e}")),
            }
        }
    }
}
