// src/cluster/mod.rs
pub mod merge;
pub mod sweep;

pub use merge::{merge_event, MergeConfig, MergeOutcome, DEFAULT_RADIUS_KM};
pub use sweep::{SweepConfig, SweepDriver, SweepReport, SweepState};
