// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod geo;
pub mod model;
pub mod shutdown;
pub mod store;

// Clustering engine (merge pass + sweep driver)
pub mod cluster;

// Collaborators: retention purge, feed ingestion, failure notices
pub mod ingest;
pub mod notify;
pub mod retention;

pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::cluster::{
    merge_event, MergeConfig, MergeOutcome, SweepConfig, SweepDriver, SweepReport, SweepState,
};
pub use crate::model::{
    Event, EventId, GeoPoint, Hashtag, NewEvent, NewPoint, Origin, Point, PointId,
};
pub use crate::notify::{FailureNotice, NotifierMux};
pub use crate::retention::{PurgeReport, Purger, RetentionConfig};
pub use crate::store::{EventStore, InMemoryStore, NearQuery, Neighbor, PointStore};
