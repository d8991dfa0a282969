use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

use crate::shutdown::Shutdown;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sweep_runs_total", "Completed merge sweeps.");
        describe_counter!(
            "sweep_events_absorbed_total",
            "Events folded into a survivor and deleted."
        );
        describe_counter!(
            "sweep_merge_failures_total",
            "Per-event merges left for the next sweep."
        );
        describe_gauge!("sweep_last_run_ts", "Unix ts when the last sweep finished.");
        describe_counter!(
            "retention_points_purged_total",
            "Points removed by the retention window."
        );
        describe_counter!(
            "retention_events_purged_total",
            "Events removed by the retention window."
        );
        describe_counter!("ingest_points_total", "Points written by feed adapters.");
        describe_counter!("ingest_malformed_total", "Feed lines dropped as malformed.");
        describe_counter!(
            "ingest_blacklisted_total",
            "Hashtags dropped by the blacklist."
        );
        describe_counter!("ingest_reconnects_total", "Feed connections opened.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }

    pub async fn serve(self, addr: SocketAddr, shutdown: Shutdown) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics listener on {addr}"))?;
        tracing::info!(%addr, "metrics exporter listening");
        let mut sd = shutdown;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { sd.cancelled().await })
            .await
            .context("metrics server")
    }
}
