// tests/common/mod.rs
// Shared fixtures: a store double that injects failures and records deletes.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::watch;

use geo_events::geo::offset_north_km;
use geo_events::{
    Event, EventId, EventStore, GeoPoint, Hashtag, InMemoryStore, NearQuery, NewEvent, Neighbor,
    SweepState,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn origin() -> GeoPoint {
    GeoPoint::new(45.0, 9.0).unwrap()
}

pub fn tag(s: &str) -> Hashtag {
    Hashtag::new(s).unwrap()
}

/// Event `km` north of [`origin`], created `secs` after [`t0`].
pub fn ev_at(km: f64, hashtag: &str, weight: u64, secs: i64) -> NewEvent {
    NewEvent::new(
        offset_north_km(origin(), km),
        tag(hashtag),
        weight,
        t0() + ChronoDuration::seconds(secs),
    )
}

pub async fn total_weight(store: &dyn EventStore, hashtag: &str) -> u64 {
    store
        .list_events()
        .await
        .unwrap()
        .iter()
        .filter(|e| e.hashtag.as_str() == hashtag)
        .map(|e| e.weight)
        .sum()
}

/// Wraps [`InMemoryStore`] and fails selected calls on demand.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    /// Number of upcoming `list_events` calls that fail.
    pub fail_list: Mutex<u32>,
    /// `near_events` fails for queries on these hashtags.
    pub fail_near: Mutex<HashSet<String>>,
    /// `delete_event` fails for these ids.
    pub fail_delete: Mutex<HashSet<EventId>>,
    /// `delete_event` removes these ids, then reports an error anyway.
    pub fail_after_delete: Mutex<HashSet<EventId>>,
    /// `get_event` fails for these ids.
    pub fail_get: Mutex<HashSet<EventId>>,
    /// `update_weight` reports a lost compare-and-swap for these ids.
    pub lose_cas: Mutex<HashSet<EventId>>,
    /// Every successful delete, in call order.
    pub deleted: Mutex<Vec<EventId>>,
    /// Extra entries returned by `list_events` that storage no longer holds.
    pub ghosts: Mutex<Vec<Event>>,
    /// When set, `near_events` records the sweep state it runs under.
    pub state_rx: Mutex<Option<watch::Receiver<SweepState>>>,
    pub states_seen: Mutex<Vec<SweepState>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn insert_event(&self, ev: NewEvent) -> Result<EventId> {
        self.inner.insert_event(ev).await
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        if self.fail_get.lock().contains(&id) {
            return Err(anyhow!("injected get failure"));
        }
        self.inner.get_event(id).await
    }

    async fn list_events(&self) -> Result<Vec<Event>> {
        {
            let mut left = self.fail_list.lock();
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("injected list failure"));
            }
        }
        let mut events = self.inner.list_events().await?;
        events.extend(self.ghosts.lock().iter().cloned());
        Ok(events)
    }

    async fn near_events(&self, q: &NearQuery) -> Result<Vec<Neighbor>> {
        if let Some(rx) = self.state_rx.lock().as_ref() {
            self.states_seen.lock().push(*rx.borrow());
        }
        if self.fail_near.lock().contains(q.hashtag.as_str()) {
            return Err(anyhow!("injected near failure"));
        }
        self.inner.near_events(q).await
    }

    async fn update_weight(&self, id: EventId, expected: u64, new: u64) -> Result<bool> {
        if self.lose_cas.lock().contains(&id) {
            return Ok(false);
        }
        self.inner.update_weight(id, expected, new).await
    }

    async fn delete_event(&self, id: EventId) -> Result<bool> {
        if self.fail_delete.lock().contains(&id) {
            return Err(anyhow!("injected delete failure"));
        }
        let removed = self.inner.delete_event(id).await?;
        if removed {
            self.deleted.lock().push(id);
        }
        if self.fail_after_delete.lock().contains(&id) {
            return Err(anyhow!("injected timeout after delete"));
        }
        Ok(removed)
    }

    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.purge_events_before(cutoff).await
    }
}
