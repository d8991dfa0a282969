// src/retention.rs
//! # Retention
//! Age-based purge of points and events. Runs on its own ticker, independent
//! of the sweep; storage is the only thing the two share.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;

use crate::notify::{FailureNotice, NotifierMux};
use crate::shutdown::Shutdown;
use crate::store::{bounded, EventStore, PointStore};

const PROCESS: &str = "retention";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Records older than this are removed.
    pub window: Duration,
    pub interval: Duration,
    pub op_timeout: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(6 * 3600),
            interval: Duration::from_secs(30),
            op_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub cutoff: DateTime<Utc>,
    pub points: u64,
    pub events: u64,
}

pub struct Purger {
    points: Arc<dyn PointStore>,
    events: Arc<dyn EventStore>,
    cfg: RetentionConfig,
    notifier: Option<Arc<NotifierMux>>,
}

impl Purger {
    pub fn new(
        points: Arc<dyn PointStore>,
        events: Arc<dyn EventStore>,
        cfg: RetentionConfig,
    ) -> Self {
        Self {
            points,
            events,
            cfg,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<NotifierMux>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Oldest instant that is still retained.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let window = ChronoDuration::from_std(self.cfg.window).unwrap_or(ChronoDuration::MAX);
        now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Removes points and events strictly older than `now - window`.
    pub async fn purge_once(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let cutoff = self.cutoff(now);
        let t = self.cfg.op_timeout;
        let points = bounded(t, "purge_points_before", self.points.purge_points_before(cutoff))
            .await
            .context("purging points")?;
        let events = bounded(t, "purge_events_before", self.events.purge_events_before(cutoff))
            .await
            .context("purging events")?;

        counter!("retention_points_purged_total").increment(points);
        counter!("retention_events_purged_total").increment(events);
        Ok(PurgeReport {
            cutoff,
            points,
            events,
        })
    }

    pub async fn run(&self, mut shutdown: Shutdown) {
        tracing::info!(
            target: "retention",
            window_secs = self.cfg.window.as_secs(),
            interval_secs = self.cfg.interval.as_secs(),
            "purger started"
        );
        loop {
            match self.purge_once(Utc::now()).await {
                Ok(r) if r.points + r.events > 0 => tracing::info!(
                    target: "retention",
                    points = r.points,
                    events = r.events,
                    cutoff = %r.cutoff,
                    "purged"
                ),
                Ok(_) => tracing::trace!(target: "retention", "nothing to purge"),
                Err(e) => {
                    tracing::warn!(target: "retention", error = ?e, "purge failed");
                    if let Some(n) = &self.notifier {
                        n.notify(&FailureNotice::new(PROCESS, &e)).await;
                    }
                }
            }
            if shutdown.sleep(self.cfg.interval).await {
                break;
            }
        }
        tracing::info!(target: "retention", "purger stopped");
    }
}
