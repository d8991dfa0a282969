//! geo-events: binary entrypoint
//! Boots the sweep driver, the retention purger, the feed adapters and the
//! optional metrics exporter in one runtime, and stops them on Ctrl-C.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use geo_events::config::AppConfig;
use geo_events::ingest::config::load_blacklist_default;
use geo_events::ingest::providers::{TeleportdProvider, TwitterProvider};
use geo_events::ingest::types::StreamProvider;
use geo_events::ingest::{run_stream, IngestContext, IngestSink};
use geo_events::metrics::Metrics;
use geo_events::shutdown;
use geo_events::{EventStore, InMemoryStore, NotifierMux, PointStore, Purger, SweepDriver};

/// Compact logs by default, JSON when `LOG_FORMAT=json`.
/// Filter from `RUST_LOG`, falling back to `geo_events=info,warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("geo_events=info,sweep=info,retention=info,ingest=info,notify=info,warn")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    let blacklist = Arc::new(load_blacklist_default()?);
    let notifier = Arc::new(NotifierMux::from_env(cfg.notify.cooldown_secs));
    tracing::info!(
        radius_km = cfg.cluster.radius_km,
        retention_secs = cfg.retention.window_secs,
        blacklist = blacklist.len(),
        notifiers = ?notifier.channel_names(),
        "configuration loaded"
    );

    let store = Arc::new(InMemoryStore::new());
    let events: Arc<dyn EventStore> = store.clone();
    let points: Arc<dyn PointStore> = store;

    let (trigger, sd) = shutdown::channel();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if let Some(addr) = cfg.metrics_addr()? {
        let metrics = Metrics::init()?;
        let sd = sd.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = metrics.serve(addr, sd).await {
                tracing::warn!(error = ?e, "metrics exporter stopped");
            }
        }));
    } else {
        geo_events::metrics::ensure_described();
    }

    let driver =
        Arc::new(SweepDriver::new(events.clone(), cfg.sweep()).with_notifier(notifier.clone()));
    {
        let sd = sd.clone();
        tasks.push(tokio::spawn(async move { driver.run(sd).await }));
    }

    let purger = Arc::new(
        Purger::new(points.clone(), events.clone(), cfg.retention())
            .with_notifier(notifier.clone()),
    );
    {
        let sd = sd.clone();
        tasks.push(tokio::spawn(async move { purger.run(sd).await }));
    }

    let ctx = IngestContext {
        sink: IngestSink {
            points,
            events: cfg.ingest.emit_events.then(|| events.clone()),
            op_timeout: cfg.op_timeout(),
        },
        blacklist,
        retry: cfg.retry(),
        stall_timeout: cfg.stall_timeout(),
        notifier: Some(notifier),
    };
    let mut providers: Vec<Arc<dyn StreamProvider>> = Vec::new();
    if let Some(p) = TwitterProvider::from_env()? {
        providers.push(Arc::new(p));
    }
    if let Some(p) = TeleportdProvider::from_env()? {
        providers.push(Arc::new(p));
    }
    if providers.is_empty() {
        tracing::warn!("no feed credentials configured; running sweep and retention only");
    }
    for p in providers {
        tasks.push(tokio::spawn(run_stream(p, ctx.clone(), sd.clone())));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    trigger.fire();
    for t in tasks {
        if let Err(e) = t.await {
            tracing::warn!(error = ?e, "task ended abnormally");
        }
    }
    Ok(())
}
