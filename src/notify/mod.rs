// src/notify/mod.rs
//! Failure side channel. Long-running processes report recoverable failures
//! here instead of exiting.

pub mod antiflutter;
pub mod email;
pub mod slack;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use self::antiflutter::AntiFlutter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    /// Which loop failed, e.g. "sweep", "retention", "ingest:twitter".
    pub process: String,
    pub error: String,
    pub ts: DateTime<Utc>,
}

impl FailureNotice {
    pub fn new(process: impl Into<String>, err: &anyhow::Error) -> Self {
        Self {
            process: process.into(),
            error: format!("{err:#}"),
            ts: Utc::now(),
        }
    }

    pub fn subject(&self) -> String {
        format!("geo-events: {} failing", self.process)
    }

    pub fn body(&self) -> String {
        format!(
            "Process: {}\nError: {}\nTimestamp: {}\n",
            self.process,
            self.error,
            self.ts.to_rfc3339()
        )
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, notice: &FailureNotice) -> Result<()>;
}

/// Always-on channel: the notice ends up in the structured log.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notice: &FailureNotice) -> Result<()> {
        tracing::error!(
            target: "notify",
            process = %notice.process,
            error = %notice.error,
            "process failure"
        );
        Ok(())
    }
}

/// Fans a notice out to every configured channel. A failing channel is
/// logged and never affects the others or the caller.
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
    gate: Mutex<AntiFlutter>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>, cooldown_secs: i64) -> Self {
        Self {
            channels,
            gate: Mutex::new(AntiFlutter::new(cooldown_secs)),
        }
    }

    /// Log channel plus email/Slack when their environment is present.
    pub fn from_env(cooldown_secs: i64) -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
        match email::EmailNotifier::from_env() {
            Ok(Some(e)) => channels.push(Box::new(e)),
            Ok(None) => tracing::debug!(target: "notify", "email disabled (no SMTP_HOST)"),
            Err(e) => tracing::warn!(target: "notify", error = ?e, "email notifier misconfigured"),
        }
        if let Some(s) = slack::SlackNotifier::from_env() {
            channels.push(Box::new(s));
        }
        Self::new(channels, cooldown_secs)
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Returns `false` when the notice was suppressed by the cooldown.
    pub async fn notify(&self, notice: &FailureNotice) -> bool {
        let allowed = match self.gate.lock() {
            Ok(mut gate) => {
                let ok = gate.should_alert(&notice.process, notice.ts);
                if ok {
                    gate.record_alert(&notice.process, notice.ts);
                }
                ok
            }
            Err(_) => true,
        };
        if !allowed {
            tracing::debug!(target: "notify", process = %notice.process, "suppressed by cooldown");
            return false;
        }
        for ch in &self.channels {
            if let Err(e) = ch.send(notice).await {
                tracing::warn!(
                    target: "notify",
                    channel = ch.name(),
                    error = ?e,
                    "notifier failed"
                );
            }
        }
        true
    }
}
