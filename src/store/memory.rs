// src/store/memory.rs
//! In-process store implementing both storage traits. Spatial lookups are a
//! linear scan in degree space, which is what a 2d index answers too.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{EventStore, NearQuery, Neighbor, PointStore};
use crate::geo::{degrees_to_km, distance_deg, km_to_degrees};
use crate::model::{Event, EventId, NewEvent, NewPoint, Point, PointId};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    events: BTreeMap<EventId, Event>,
    points: BTreeMap<PointId, Point>,
}

impl Inner {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    pub fn all_points(&self) -> Result<Vec<Point>> {
        Ok(self.read()?.points.values().cloned().collect())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn insert_event(&self, ev: NewEvent) -> Result<EventId> {
        let mut g = self.write()?;
        let id = EventId(g.next());
        g.events.insert(id, Event::from_new(id, ev));
        Ok(id)
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.read()?.events.get(&id).cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>> {
        Ok(self.read()?.events.values().cloned().collect())
    }

    async fn near_events(&self, q: &NearQuery) -> Result<Vec<Neighbor>> {
        let max_deg = km_to_degrees(q.radius_km);
        let g = self.read()?;
        let mut out: Vec<(f64, &Event)> = g
            .events
            .values()
            .filter(|e| e.hashtag == q.hashtag)
            .map(|e| (distance_deg(q.center, e.loc), e))
            .filter(|(d, _)| *d <= max_deg)
            .collect();
        out.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        Ok(out
            .into_iter()
            .map(|(d, e)| Neighbor {
                event: e.clone(),
                distance_km: degrees_to_km(d),
            })
            .collect())
    }

    async fn update_weight(&self, id: EventId, expected: u64, new: u64) -> Result<bool> {
        let mut g = self.write()?;
        match g.events.get_mut(&id) {
            Some(e) if e.weight == expected => {
                e.weight = new.max(1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_event(&self, id: EventId) -> Result<bool> {
        Ok(self.write()?.events.remove(&id).is_some())
    }

    async fn purge_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut g = self.write()?;
        let before = g.events.len();
        g.events.retain(|_, e| e.created_at >= cutoff);
        Ok((before - g.events.len()) as u64)
    }
}

#[async_trait]
impl PointStore for InMemoryStore {
    async fn insert_point(&self, p: NewPoint) -> Result<PointId> {
        let mut g = self.write()?;
        let id = PointId(g.next());
        g.points.insert(id, Point::from_new(id, p));
        Ok(id)
    }

    async fn mark_point(&self, id: PointId, visited: bool, clusterized: bool) -> Result<bool> {
        let mut g = self.write()?;
        match g.points.get_mut(&id) {
            Some(p) => {
                p.visited = visited;
                p.clusterized = clusterized;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_points(&self) -> Result<u64> {
        Ok(self.read()?.points.len() as u64)
    }

    async fn purge_points_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut g = self.write()?;
        let before = g.points.len();
        g.points.retain(|_, p| p.timestamp >= cutoff);
        Ok((before - g.points.len()) as u64)
    }
}
