//! # Records
//! Points (raw geotagged mentions) and Events (consolidated clusters), plus
//! the small value types they are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Returns `None` for non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self { lat, lon })
    }
}

/// Lowercased hashtag text without the leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hashtag(String);

impl Hashtag {
    pub fn new(raw: &str) -> Option<Self> {
        let t = raw.trim();
        let t = t.strip_prefix('#').unwrap_or(t).trim();
        if t.is_empty() {
            return None;
        }
        Some(Self(t.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hashtag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ev-{}", self.0)
    }
}

/// Provenance of a point in its upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "feed", content = "id", rename_all = "lowercase")]
pub enum Origin {
    Twitter(u64),
    Teleportd(String),
}

/// A point as produced by an ingestion adapter, before storage assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPoint {
    pub loc: GeoPoint,
    pub hashtag: Hashtag,
    pub timestamp: DateTime<Utc>,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub loc: GeoPoint,
    pub hashtag: Hashtag,
    pub timestamp: DateTime<Utc>,
    pub origin: Origin,
    pub visited: bool,
    pub clusterized: bool,
}

impl Point {
    pub fn from_new(id: PointId, p: NewPoint) -> Self {
        Self {
            id,
            loc: p.loc,
            hashtag: p.hashtag,
            timestamp: p.timestamp,
            origin: p.origin,
            visited: false,
            clusterized: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub loc: GeoPoint,
    pub hashtag: Hashtag,
    pub weight: u64,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    /// Weight is clamped to at least 1.
    pub fn new(loc: GeoPoint, hashtag: Hashtag, weight: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            loc,
            hashtag,
            weight: weight.max(1),
            created_at,
        }
    }

    /// A single-point event, as emitted alongside a freshly ingested point.
    pub fn from_point(p: &NewPoint) -> Self {
        Self::new(p.loc, p.hashtag.clone(), 1, p.timestamp)
    }
}

/// A consolidated cluster. `loc` is the location of its representative
/// member, not a centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub loc: GeoPoint,
    pub hashtag: Hashtag,
    pub weight: u64,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn from_new(id: EventId, e: NewEvent) -> Self {
        Self {
            id,
            loc: e.loc,
            hashtag: e.hashtag,
            weight: e.weight.max(1),
            created_at: e.created_at,
        }
    }
}
