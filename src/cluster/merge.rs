// src/cluster/merge.rs
//! # Cluster Merge Pass
//! Folds every event that shares a hashtag with `E` and lies within the merge
//! radius of `E`'s representative location into `E`.
//!
//! Write order: the survivor's new weight is persisted (compare-and-swap)
//! before any absorbed record is deleted. A reader may briefly see the same
//! points counted twice, never zero times. If a delete fails and the record
//! is confirmed still present, the survivor is compensated back down to the
//! weight it actually absorbed. When that cannot be confirmed, the
//! over-count is kept.

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::time::Duration;

use crate::model::{Event, EventId};
use crate::store::{bounded, EventStore, NearQuery};

pub const DEFAULT_RADIUS_KM: f64 = 50.0;
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    pub radius_km: f64,
    /// Deadline for each individual storage call.
    pub op_timeout: Duration,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// `E` no longer exists (absorbed elsewhere or purged).
    Missing,
    /// No other record within the radius.
    Unchanged,
    Merged {
        survivor: EventId,
        absorbed: Vec<EventId>,
        weight: u64,
    },
}

/// Distinct matches of `event`, excluding `event` itself by identity.
fn fold_candidates(event: &Event, matches: impl IntoIterator<Item = Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| m.id != event.id && m.hashtag == event.hashtag)
        .filter(|m| seen.insert(m.id))
        .collect()
}

/// Run the merge pass for the event currently stored under `id`.
///
/// Errors mean the fold was not completed; the caller retries on the next
/// sweep. Whatever was deleted before the error is already reflected in the
/// survivor's stored weight.
pub async fn merge_event<S>(store: &S, id: EventId, cfg: &MergeConfig) -> Result<MergeOutcome>
where
    S: EventStore + ?Sized,
{
    let t = cfg.op_timeout;

    let Some(event) = bounded(t, "get_event", store.get_event(id)).await? else {
        return Ok(MergeOutcome::Missing);
    };

    let query = NearQuery {
        center: event.loc,
        hashtag: event.hashtag.clone(),
        radius_km: cfg.radius_km,
    };
    let neighbors = bounded(t, "near_events", store.near_events(&query)).await?;
    let victims = fold_candidates(&event, neighbors.into_iter().map(|n| n.event));
    if victims.is_empty() {
        return Ok(MergeOutcome::Unchanged);
    }

    let gained = victims
        .iter()
        .fold(0u64, |acc, v| acc.saturating_add(v.weight));
    let target = event.weight.saturating_add(gained);

    let swapped = bounded(
        t,
        "update_weight",
        store.update_weight(event.id, event.weight, target),
    )
    .await?;
    if !swapped {
        return Err(anyhow!(
            "{} changed during merge (expected weight {}), fold skipped",
            event.id,
            event.weight
        ));
    }

    let mut absorbed = Vec::with_capacity(victims.len());
    let mut not_absorbed = 0u64;
    let mut failure = None;
    for v in &victims {
        if failure.is_some() {
            not_absorbed = not_absorbed.saturating_add(v.weight);
            continue;
        }
        match bounded(t, "delete_event", store.delete_event(v.id)).await {
            Ok(true) => absorbed.push(v.id),
            Ok(false) => {
                // already gone (purged or folded elsewhere): do not count it
                tracing::debug!(
                    target: "sweep",
                    survivor = %event.id,
                    vanished = %v.id,
                    "merge candidate vanished"
                );
                not_absorbed = not_absorbed.saturating_add(v.weight);
            }
            Err(e) => {
                // the delete may have committed before failing: only a record
                // confirmed present is taken back out of the survivor
                match bounded(t, "get_event", store.get_event(v.id)).await {
                    Ok(Some(_)) => not_absorbed = not_absorbed.saturating_add(v.weight),
                    Ok(None) => absorbed.push(v.id),
                    Err(check) => tracing::warn!(
                        target: "sweep",
                        survivor = %event.id,
                        victim = %v.id,
                        error = ?check,
                        "delete outcome unknown; keeping its weight on the survivor"
                    ),
                }
                failure = Some(e);
            }
        }
    }

    let mut weight = target;
    if not_absorbed > 0 {
        let corrected = target.saturating_sub(not_absorbed).max(1);
        match bounded(
            t,
            "update_weight",
            store.update_weight(event.id, target, corrected),
        )
        .await
        {
            Ok(true) => weight = corrected,
            Ok(false) => tracing::warn!(
                target: "sweep",
                survivor = %event.id,
                excess = not_absorbed,
                "survivor changed before compensation; weight may over-count"
            ),
            Err(e) => tracing::warn!(
                target: "sweep",
                survivor = %event.id,
                excess = not_absorbed,
                error = ?e,
                "compensation failed; weight may over-count"
            ),
        }
    }

    if let Some(e) = failure {
        return Err(e.context(format!(
            "{} absorbed {} of {} matches before a delete failed",
            event.id,
            absorbed.len(),
            victims.len()
        )));
    }

    if absorbed.is_empty() {
        return Ok(MergeOutcome::Unchanged);
    }

    Ok(MergeOutcome::Merged {
        survivor: event.id,
        absorbed,
        weight,
    })
}
