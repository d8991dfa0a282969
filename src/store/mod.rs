// src/store/mod.rs
//! Storage seam. The clustering engine, the purger and the ingest adapters
//! only talk to storage through these traits.

pub mod memory;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::model::{Event, EventId, GeoPoint, Hashtag, NewEvent, NewPoint, PointId};

pub use memory::InMemoryStore;

/// Distance-bounded lookup with a hashtag equality predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct NearQuery {
    pub center: GeoPoint,
    pub hashtag: Hashtag,
    pub radius_km: f64,
}

/// One match of a [`NearQuery`], paired with its distance from the center.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub event: Event,
    pub distance_km: f64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, ev: NewEvent) -> Result<EventId>;

    async fn get_event(&self, id: EventId) -> Result<Option<Event>>;

    /// Every event currently stored. Callers treat the result as a snapshot.
    async fn list_events(&self) -> Result<Vec<Event>>;

    /// Matches ordered by ascending distance. Zero matches is not an error.
    async fn near_events(&self, q: &NearQuery) -> Result<Vec<Neighbor>>;

    /// Compare-and-swap on the weight. Returns `false` when the record is
    /// gone or its weight is no longer `expected`.
    async fn update_weight(&self, id: EventId, expected: u64, new: u64) -> Result<bool>;

    /// Returns whether a record was actually removed.
    async fn delete_event(&self, id: EventId) -> Result<bool>;

    /// Removes events created strictly before `cutoff`; returns how many.
    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait PointStore: Send + Sync {
    async fn insert_point(&self, p: NewPoint) -> Result<PointId>;

    async fn mark_point(&self, id: PointId, visited: bool, clusterized: bool) -> Result<bool>;

    async fn count_points(&self) -> Result<u64>;

    /// Removes points observed strictly before `cutoff`; returns how many.
    async fn purge_points_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Run one storage call under a deadline.
pub async fn bounded<T, F>(timeout: Duration, op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res.with_context(|| format!("storage {op}")),
        Err(_) => Err(anyhow!("storage {op} timed out after {timeout:?}")),
    }
}
