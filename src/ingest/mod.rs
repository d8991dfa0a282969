// src/ingest/mod.rs
//! Stream ingestion: feed lines → lowercased, blacklist-filtered points
//! (and optionally single-point events) in storage.

pub mod config;
pub mod providers;
pub mod retry;
pub mod types;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::config::Blacklist;
use crate::ingest::retry::{Backoff, RetryPolicy};
use crate::ingest::types::{LineSource, RawMention, StreamProvider};
use crate::model::{Hashtag, NewEvent, NewPoint};
use crate::notify::{FailureNotice, NotifierMux};
use crate::shutdown::Shutdown;
use crate::store::{bounded, EventStore, PointStore};

/// Where ingested records go.
#[derive(Clone)]
pub struct IngestSink {
    pub points: Arc<dyn PointStore>,
    /// When set, every stored point is mirrored as a weight-1 event.
    pub events: Option<Arc<dyn EventStore>>,
    pub op_timeout: Duration,
}

#[derive(Clone)]
pub struct IngestContext {
    pub sink: IngestSink,
    pub blacklist: Arc<Blacklist>,
    pub retry: RetryPolicy,
    /// Longest silence tolerated from a feed, while connecting or streaming.
    pub stall_timeout: Duration,
    pub notifier: Option<Arc<NotifierMux>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    pub lines: u64,
    pub points: u64,
    pub skipped: u64,
    pub malformed: u64,
    pub blacklisted: u64,
}

/// One point per distinct, non-blacklisted hashtag of the mention.
/// Returns the points and how many hashtags the blacklist removed.
pub fn mention_to_points(
    m: &RawMention,
    blacklist: &Blacklist,
    now: DateTime<Utc>,
) -> (Vec<NewPoint>, u64) {
    let mut seen = BTreeSet::new();
    let mut blocked = 0u64;
    let mut out = Vec::with_capacity(m.hashtags.len());
    for raw in &m.hashtags {
        let Some(tag) = Hashtag::new(raw) else {
            continue;
        };
        if blacklist.contains(&tag) {
            blocked += 1;
            continue;
        }
        if !seen.insert(tag.clone()) {
            continue;
        }
        out.push(NewPoint {
            loc: m.loc,
            hashtag: tag,
            timestamp: now,
            origin: m.origin.clone(),
        });
    }
    (out, blocked)
}

/// Parse and store one feed line. Malformed lines are counted and dropped;
/// only storage failures are returned as errors.
pub async fn ingest_line(
    provider: &dyn StreamProvider,
    line: &str,
    blacklist: &Blacklist,
    sink: &IngestSink,
    now: DateTime<Utc>,
    stats: &mut LineStats,
) -> Result<()> {
    stats.lines += 1;
    let mention = match provider.parse_line(line) {
        Ok(Some(m)) => m,
        Ok(None) => {
            stats.skipped += 1;
            return Ok(());
        }
        Err(e) => {
            stats.malformed += 1;
            counter!("ingest_malformed_total").increment(1);
            tracing::debug!(
                target: "ingest",
                provider = provider.name(),
                error = ?e,
                "malformed line dropped"
            );
            return Ok(());
        }
    };

    let (points, blocked) = mention_to_points(&mention, blacklist, now);
    if blocked > 0 {
        stats.blacklisted += blocked;
        counter!("ingest_blacklisted_total").increment(blocked);
    }

    let t = sink.op_timeout;
    for p in points {
        let event = sink.events.as_ref().map(|_| NewEvent::from_point(&p));
        bounded(t, "insert_point", sink.points.insert_point(p)).await?;
        if let (Some(store), Some(ev)) = (&sink.events, event) {
            bounded(t, "insert_event", store.insert_event(ev)).await?;
        }
        stats.points += 1;
        counter!("ingest_points_total").increment(1);
    }
    Ok(())
}

/// Ingest lines until end of stream, shutdown, a stall, or a read/storage
/// error.
pub async fn drain(
    provider: &dyn StreamProvider,
    source: &mut dyn LineSource,
    ctx: &IngestContext,
    shutdown: &mut Shutdown,
    stats: &mut LineStats,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = tokio::time::timeout(ctx.stall_timeout, source.next_line()) => line
                .map_err(|_| anyhow!("feed silent for {:?}", ctx.stall_timeout))??,
        };
        let Some(line) = next else {
            return Ok(());
        };
        ingest_line(provider, &line, &ctx.blacklist, &ctx.sink, Utc::now(), stats).await?;
    }
}

/// Keep one feed connected until shutdown. Disconnects and errors are
/// retried per the context's [`RetryPolicy`]; nothing here is fatal.
pub async fn run_stream(
    provider: Arc<dyn StreamProvider>,
    ctx: IngestContext,
    mut shutdown: Shutdown,
) {
    let process = format!("ingest:{}", provider.name());
    let mut backoff = Backoff::new(ctx.retry);
    tracing::info!(
        target: "ingest",
        provider = provider.name(),
        blacklist = ctx.blacklist.len(),
        "adapter started"
    );

    loop {
        if shutdown.is_triggered() {
            break;
        }
        let mut stats = LineStats::default();
        let opened = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = tokio::time::timeout(ctx.stall_timeout, provider.open()) => res
                .map_err(|_| anyhow!("no response within {:?}", ctx.stall_timeout))
                .and_then(|r| r),
        };
        let res = match opened {
            Ok(mut source) => {
                counter!("ingest_reconnects_total").increment(1);
                drain(provider.as_ref(), source.as_mut(), &ctx, &mut shutdown, &mut stats).await
            }
            Err(e) => Err(e),
        };
        if stats.lines > 0 {
            backoff.reset();
        }

        let wait = match res {
            Ok(()) => {
                tracing::info!(
                    target: "ingest",
                    provider = provider.name(),
                    lines = stats.lines,
                    points = stats.points,
                    malformed = stats.malformed,
                    "stream ended; reconnecting"
                );
                backoff.after_eof()
            }
            Err(e) => {
                let step = backoff.on_failure();
                tracing::warn!(
                    target: "ingest",
                    provider = provider.name(),
                    failures = backoff.failures(),
                    retry_in_secs = step.delay.as_secs(),
                    error = ?e,
                    "stream failed"
                );
                if step.notify {
                    if let Some(n) = &ctx.notifier {
                        n.notify(&FailureNotice::new(process.clone(), &e)).await;
                    }
                }
                step.delay
            }
        };
        if shutdown.sleep(wait).await {
            break;
        }
    }
    tracing::info!(target: "ingest", provider = provider.name(), "adapter stopped");
}
