// src/ingest/providers/twitter.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::ingest::types::{
    stream_client, FixtureLines, HttpLines, LineSource, RawMention, StreamProvider,
};
use crate::model::{GeoPoint, Origin};

/// Worldwide bounding box: every geotagged status.
pub const DEFAULT_STREAM_URL: &str =
    "https://stream.twitter.com/1/statuses/filter.json?locations=-180,-90,180,90";

#[derive(Debug, Deserialize)]
struct Status {
    created_at: Option<String>,
    id: Option<u64>,
    entities: Option<Entities>,
    geo: Option<Geo>,
}

#[derive(Debug, Deserialize)]
struct Entities {
    #[serde(default)]
    hashtags: Vec<HashtagEntity>,
}

#[derive(Debug, Deserialize)]
struct HashtagEntity {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Geo {
    #[serde(default)]
    coordinates: Vec<f64>, // [lat, lon]
}

/// One fixed account; reconnects go through the adapter's retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterCredentials {
    pub user: String,
    pub password: String,
}

pub struct TwitterProvider {
    mode: Mode,
}

enum Mode {
    Fixture(Vec<String>),
    Http {
        url: String,
        creds: TwitterCredentials,
        client: reqwest::Client,
    },
}

impl TwitterProvider {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.lines().map(str::to_string).collect()),
        }
    }

    pub fn from_url(url: impl Into<String>, creds: TwitterCredentials) -> Result<Self> {
        Ok(Self {
            mode: Mode::Http {
                url: url.into(),
                creds,
                client: stream_client()?,
            },
        })
    }

    /// `None` unless `TWITTER_USER` and `TWITTER_PASSWORD` are set.
    /// `TWITTER_STREAM_URL` overrides the endpoint.
    pub fn from_env() -> Result<Option<Self>> {
        let (Ok(user), Ok(password)) = (
            std::env::var("TWITTER_USER"),
            std::env::var("TWITTER_PASSWORD"),
        ) else {
            return Ok(None);
        };
        let url =
            std::env::var("TWITTER_STREAM_URL").unwrap_or_else(|_| DEFAULT_STREAM_URL.to_string());
        Self::from_url(url, TwitterCredentials { user, password }).map(Some)
    }
}

pub(crate) fn parse_status(line: &str) -> Result<Option<RawMention>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let st: Status = serde_json::from_str(line).context("parsing twitter status json")?;

    // deletes, limit notices and other control messages carry no created_at
    if st.created_at.is_none() {
        return Ok(None);
    }
    let hashtags: Vec<String> = st
        .entities
        .map(|e| e.hashtags.into_iter().map(|h| h.text).collect())
        .unwrap_or_default();
    if hashtags.is_empty() {
        return Ok(None);
    }
    let Some(geo) = st.geo.filter(|g| !g.coordinates.is_empty()) else {
        return Ok(None);
    };

    let [lat, lon] = geo.coordinates[..] else {
        return Err(anyhow!(
            "geo.coordinates has {} values, expected 2",
            geo.coordinates.len()
        ));
    };
    let loc = GeoPoint::new(lat, lon)
        .ok_or_else(|| anyhow!("coordinates out of range: {lat},{lon}"))?;
    let id = st.id.ok_or_else(|| anyhow!("status without id"))?;

    Ok(Some(RawMention {
        loc,
        hashtags,
        origin: Origin::Twitter(id),
    }))
}

#[async_trait]
impl StreamProvider for TwitterProvider {
    fn name(&self) -> &'static str {
        "twitter"
    }

    async fn open(&self) -> Result<Box<dyn LineSource>> {
        match &self.mode {
            Mode::Fixture(lines) => Ok(Box::new(FixtureLines::new(lines.clone()))),
            Mode::Http { url, creds, client } => {
                let resp = client
                    .get(url)
                    .basic_auth(&creds.user, Some(&creds.password))
                    .send()
                    .await
                    .context("twitter stream connect")?
                    .error_for_status()
                    .context("twitter stream status")?;
                Ok(Box::new(HttpLines::new(resp)))
            }
        }
    }

    fn parse_line(&self, line: &str) -> Result<Option<RawMention>> {
        parse_status(line)
    }
}
