// src/config.rs
//! Service configuration: one TOML file, every field defaulted. Secrets
//! (feed credentials, SMTP, Slack) stay in the environment.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cluster::{MergeConfig, SweepConfig, DEFAULT_RADIUS_KM};
use crate::ingest::retry::RetryPolicy;
use crate::retention::RetentionConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/geo_events.toml";
pub const ENV_CONFIG_PATH: &str = "GEO_EVENTS_CONFIG";

fn default_radius_km() -> f64 {
    DEFAULT_RADIUS_KM
}
fn default_pause_ms() -> u64 {
    1_000
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_timeout_ms() -> u64 {
    5_000
}
fn default_window_secs() -> u64 {
    6 * 3600
}
fn default_interval_secs() -> u64 {
    30
}
fn default_max_delay_secs() -> u64 {
    300
}
fn default_notify_after() -> u32 {
    5
}
fn default_stall_timeout_secs() -> u64 {
    90
}
fn default_true() -> bool {
    true
}
fn default_cooldown_secs() -> i64 {
    900
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSection {
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Deadline for each individual storage call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionSection {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSection {
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_notify_after")]
    pub notify_after: u32,
    /// Reconnect when an open feed sends nothing (keep-alives included) for this long.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    /// Mirror each ingested point as a weight-1 event.
    #[serde(default = "default_true")]
    pub emit_events: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifySection {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSection {
    /// e.g. "127.0.0.1:9464"; unset disables the exporter.
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub retention: RetentionSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            radius_km: default_radius_km(),
            pause_ms: default_pause_ms(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            notify_after: default_notify_after(),
            stall_timeout_secs: default_stall_timeout_secs(),
            emit_events: default_true(),
        }
    }
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data)
    }

    /// 1) $GEO_EVENTS_CONFIG (must exist), 2) config/geo_events.toml, 3) defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if p.exists() {
            return Self::load_from_file(&p);
        }
        Ok(Self::default())
    }

    /// Replace nonsensical values with defaults.
    fn sanitize(&mut self) {
        if !self.cluster.radius_km.is_finite() || self.cluster.radius_km <= 0.0 {
            self.cluster.radius_km = default_radius_km();
        }
        if self.storage.timeout_ms == 0 {
            self.storage.timeout_ms = default_timeout_ms();
        }
        if self.retention.window_secs == 0 {
            self.retention.window_secs = default_window_secs();
        }
        if self.retention.interval_secs == 0 {
            self.retention.interval_secs = default_interval_secs();
        }
        if self.ingest.retry_delay_secs == 0 {
            self.ingest.retry_delay_secs = default_retry_delay_secs();
        }
        if self.ingest.stall_timeout_secs == 0 {
            self.ingest.stall_timeout_secs = default_stall_timeout_secs();
        }
        if self.ingest.max_delay_secs < self.ingest.retry_delay_secs {
            self.ingest.max_delay_secs = self.ingest.retry_delay_secs;
        }
        if self.metrics.listen.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.metrics.listen = None;
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.timeout_ms)
    }

    pub fn sweep(&self) -> SweepConfig {
        SweepConfig {
            merge: MergeConfig {
                radius_km: self.cluster.radius_km,
                op_timeout: self.op_timeout(),
            },
            pause: Duration::from_millis(self.cluster.pause_ms),
            retry_delay: Duration::from_secs(self.cluster.retry_delay_secs),
        }
    }

    pub fn retention(&self) -> RetentionConfig {
        RetentionConfig {
            window: Duration::from_secs(self.retention.window_secs),
            interval: Duration::from_secs(self.retention.interval_secs),
            op_timeout: self.op_timeout(),
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(self.ingest.retry_delay_secs),
            max_delay: Duration::from_secs(self.ingest.max_delay_secs),
            notify_after: self.ingest.notify_after,
        }
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.stall_timeout_secs)
    }

    pub fn metrics_addr(&self) -> Result<Option<SocketAddr>> {
        self.metrics
            .listen
            .as_deref()
            .map(|s| {
                s.trim()
                    .parse::<SocketAddr>()
                    .with_context(|| format!("invalid metrics.listen {s:?}"))
            })
            .transpose()
    }
}
