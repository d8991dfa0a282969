// src/cluster/sweep.rs
//! # Sweep Driver
//! Repeated merge passes over a snapshot of all events.
//!
//! Policy for chained clusters: the snapshot is visited oldest first
//! (`created_at`, then identity). An event absorbs only records directly
//! within the radius of its own location; there is no transitive closure.
//! Records absorbed earlier in a sweep are never visited as `E` afterwards.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::merge::{merge_event, MergeConfig, MergeOutcome};
use crate::model::EventId;
use crate::notify::{FailureNotice, NotifierMux};
use crate::shutdown::Shutdown;
use crate::store::{bounded, EventStore};

const PROCESS: &str = "sweep";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Sweeping,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepConfig {
    pub merge: MergeConfig,
    /// Pause between two complete sweeps.
    pub pause: Duration,
    /// Wait before retrying a sweep whose snapshot could not be taken.
    pub retry_delay: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            merge: MergeConfig::default(),
            pause: Duration::from_secs(1),
            retry_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub snapshot: usize,
    /// Snapshot entries still present when their turn came.
    pub visited: usize,
    pub merged: usize,
    pub absorbed: usize,
    pub failed: usize,
    /// Already absorbed in this sweep, or gone from storage.
    pub skipped: usize,
    pub cancelled: bool,
}

pub struct SweepDriver {
    store: Arc<dyn EventStore>,
    cfg: SweepConfig,
    notifier: Option<Arc<NotifierMux>>,
    state: watch::Sender<SweepState>,
}

impl SweepDriver {
    pub fn new(store: Arc<dyn EventStore>, cfg: SweepConfig) -> Self {
        let (state, _) = watch::channel(SweepState::Idle);
        Self {
            store,
            cfg,
            notifier: None,
            state,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<NotifierMux>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> SweepState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SweepState> {
        self.state.subscribe()
    }

    /// Identities to visit, oldest first.
    async fn snapshot(&self) -> Result<Vec<EventId>> {
        let mut events = bounded(
            self.cfg.merge.op_timeout,
            "list_events",
            self.store.list_events(),
        )
        .await
        .context("taking sweep snapshot")?;
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let mut seen = HashSet::with_capacity(events.len());
        Ok(events
            .into_iter()
            .map(|e| e.id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    /// One full sweep. Fails only when the snapshot cannot be taken; errors
    /// of individual merges are counted in the report.
    pub async fn sweep_once(&self, shutdown: &Shutdown) -> Result<SweepReport> {
        self.state.send_replace(SweepState::Sweeping);
        let res = self.sweep_inner(shutdown).await;
        self.state.send_replace(SweepState::Idle);
        res
    }

    async fn sweep_inner(&self, shutdown: &Shutdown) -> Result<SweepReport> {
        let ids = self.snapshot().await?;
        let mut report = SweepReport {
            snapshot: ids.len(),
            ..SweepReport::default()
        };
        let mut absorbed: HashSet<EventId> = HashSet::new();

        for id in ids {
            // cancellation only between merges, never inside one
            if shutdown.is_triggered() {
                report.cancelled = true;
                break;
            }
            if absorbed.contains(&id) {
                report.skipped += 1;
                continue;
            }

            let outcome = merge_event(self.store.as_ref(), id, &self.cfg.merge).await;
            if matches!(outcome, Ok(MergeOutcome::Missing)) {
                report.skipped += 1;
                continue;
            }
            report.visited += 1;

            match outcome {
                Ok(MergeOutcome::Missing | MergeOutcome::Unchanged) => {}
                Ok(MergeOutcome::Merged {
                    survivor,
                    absorbed: gone,
                    weight,
                }) => {
                    tracing::debug!(
                        target: "sweep",
                        %survivor,
                        absorbed = gone.len(),
                        weight,
                        "events merged"
                    );
                    report.merged += 1;
                    report.absorbed += gone.len();
                    absorbed.extend(gone);
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("sweep_merge_failures_total").increment(1);
                    tracing::warn!(
                        target: "sweep",
                        event_id = %id,
                        error = ?e,
                        "merge failed; retrying next sweep"
                    );
                }
            }
        }

        counter!("sweep_runs_total").increment(1);
        counter!("sweep_events_absorbed_total").increment(report.absorbed as u64);
        gauge!("sweep_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        Ok(report)
    }

    /// Sweep until shutdown. Snapshot failures are notified and retried
    /// after `retry_delay`; they never end the loop.
    pub async fn run(&self, mut shutdown: Shutdown) {
        tracing::info!(
            target: "sweep",
            radius_km = self.cfg.merge.radius_km,
            "sweep driver started"
        );
        loop {
            if shutdown.is_triggered() {
                break;
            }
            let wait = match self.sweep_once(&shutdown).await {
                Ok(report) => {
                    tracing::info!(
                        target: "sweep",
                        snapshot = report.snapshot,
                        merged = report.merged,
                        absorbed = report.absorbed,
                        failed = report.failed,
                        "sweep finished"
                    );
                    self.cfg.pause
                }
                Err(e) => {
                    tracing::warn!(target: "sweep", error = ?e, "sweep aborted");
                    if let Some(n) = &self.notifier {
                        n.notify(&FailureNotice::new(PROCESS, &e)).await;
                    }
                    self.cfg.retry_delay
                }
            };
            if shutdown.sleep(wait).await {
                break;
            }
        }
        tracing::info!(target: "sweep", "sweep driver stopped");
    }
}
