// src/ingest/providers/teleportd.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::types::{
    stream_client, FixtureLines, HttpLines, LineSource, RawMention, StreamProvider,
};
use crate::model::{GeoPoint, Origin};

pub const DEFAULT_STREAM_URL: &str = "http://api.teleportd.com/stream";

#[derive(Debug, Deserialize)]
struct Photo {
    loc: Option<Loc>,
    hashtag: Option<Vec<String>>,
    sha: Option<String>,
}

/// The feed has used both `[lat, lon]` and `{lat, lon}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loc {
    Pair(Vec<f64>),
    Object { lat: f64, lon: f64 },
}

impl Loc {
    fn to_point(&self) -> Result<GeoPoint> {
        let (lat, lon) = match self {
            Loc::Pair(v) => match v[..] {
                [lat, lon] => (lat, lon),
                _ => return Err(anyhow!("loc has {} values, expected 2", v.len())),
            },
            Loc::Object { lat, lon } => (*lat, *lon),
        };
        GeoPoint::new(lat, lon).ok_or_else(|| anyhow!("loc out of range: {lat},{lon}"))
    }
}

pub struct TeleportdProvider {
    mode: Mode,
}

enum Mode {
    Fixture(Vec<String>),
    Http {
        url: String,
        user_key: String,
        client: reqwest::Client,
    },
}

impl TeleportdProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.lines().map(str::to_string).collect()),
        }
    }

    pub fn from_url(url: impl Into<String>, user_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            mode: Mode::Http {
                url: url.into(),
                user_key: user_key.into(),
                client: stream_client()?,
            },
        })
    }

    /// `None` unless `TELEPORTD_USER_KEY` is set.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(key) = std::env::var("TELEPORTD_USER_KEY") else {
            return Ok(None);
        };
        let url = std::env::var("TELEPORTD_STREAM_URL")
            .unwrap_or_else(|_| DEFAULT_STREAM_URL.to_string());
        Self::from_url(url, key).map(Some)
    }
}

pub(crate) fn parse_photo(line: &str) -> Result<Option<RawMention>> {
    let line = line.trim();
    if line.is_empty() || line == "null" {
        return Ok(None);
    }
    let photo: Photo = serde_json::from_str(line).context("parsing teleportd json")?;

    let Some(loc) = photo.loc else {
        return Ok(None);
    };
    let hashtags = photo.hashtag.unwrap_or_default();
    if hashtags.is_empty() {
        return Ok(None);
    }
    let loc = loc.to_point()?;
    let sha = photo
        .sha
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("photo without sha"))?;

    Ok(Some(RawMention {
        loc,
        hashtags,
        origin: Origin::Teleportd(sha),
    }))
}

#[async_trait]
impl StreamProvider for TeleportdProvider {
    fn name(&self) -> &'static str {
        "teleportd"
    }

    async fn open(&self) -> Result<Box<dyn LineSource>> {
        match &self.mode {
            Mode::Fixture(lines) => Ok(Box::new(FixtureLines::new(lines.clone()))),
            Mode::Http {
                url,
                user_key,
                client,
            } => {
                let resp = client
                    .get(url)
                    .query(&[("user_key", user_key)])
                    .send()
                    .await
                    .context("teleportd stream connect")?
                    .error_for_status()
                    .context("teleportd stream status")?;
                Ok(Box::new(HttpLines::new(resp)))
            }
        }
    }

    fn parse_line(&self, line: &str) -> Result<Option<RawMention>> {
        parse_photo(line)
    }
}
