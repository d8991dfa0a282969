// tests/sweep_failures.rs
mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{ev_at, total_weight, FlakyStore};
use geo_events::notify::Notifier;
use geo_events::shutdown::{self, Shutdown};
use geo_events::{
    merge_event, EventStore, FailureNotice, MergeConfig, NotifierMux, SweepConfig, SweepDriver,
    SweepState,
};

#[derive(Clone, Default)]
struct Recording(Arc<Mutex<Vec<String>>>);

#[async_trait]
impl Notifier for Recording {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, notice: &FailureNotice) -> anyhow::Result<()> {
        self.0.lock().push(notice.process.clone());
        Ok(())
    }
}

fn fast_sweeps() -> SweepConfig {
    SweepConfig {
        pause: Duration::from_millis(100),
        retry_delay: Duration::from_millis(500),
        ..SweepConfig::default()
    }
}

#[tokio::test]
async fn failed_delete_compensates_survivor_weight() {
    let store = FlakyStore::new();
    let a = store.insert_event(ev_at(0.0, "fire", 3, 0)).await.unwrap();
    let b = store.insert_event(ev_at(10.0, "fire", 5, 1)).await.unwrap();
    let c = store.insert_event(ev_at(20.0, "fire", 2, 2)).await.unwrap();
    store.fail_delete.lock().insert(c);

    let err = merge_event(&store, a, &MergeConfig::default())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("injected delete failure"));

    // B was folded in, C was not: A carries exactly what it absorbed
    assert_eq!(store.get_event(b).await.unwrap(), None);
    assert_eq!(store.get_event(a).await.unwrap().unwrap().weight, 8);
    assert_eq!(store.get_event(c).await.unwrap().unwrap().weight, 2);
    assert_eq!(total_weight(&store, "fire").await, 10);

    // the next attempt finishes the fold
    store.fail_delete.lock().clear();
    merge_event(&store, a, &MergeConfig::default()).await.unwrap();
    assert_eq!(store.list_events().await.unwrap().len(), 1);
    assert_eq!(total_weight(&store, "fire").await, 10);
}

#[tokio::test]
async fn delete_that_committed_before_failing_keeps_its_weight() {
    let store = FlakyStore::new();
    let a = store.insert_event(ev_at(0.0, "fire", 3, 0)).await.unwrap();
    let b = store.insert_event(ev_at(2.0, "fire", 5, 1)).await.unwrap();
    store.fail_after_delete.lock().insert(b);

    assert!(merge_event(&store, a, &MergeConfig::default()).await.is_err());

    assert_eq!(store.get_event(b).await.unwrap(), None);
    assert_eq!(store.get_event(a).await.unwrap().unwrap().weight, 8);
    assert_eq!(total_weight(&store, "fire").await, 8);
}

#[tokio::test]
async fn unconfirmed_delete_prefers_over_count_to_loss() {
    let store = FlakyStore::new();
    let a = store.insert_event(ev_at(0.0, "fire", 3, 0)).await.unwrap();
    let b = store.insert_event(ev_at(2.0, "fire", 5, 1)).await.unwrap();
    store.fail_delete.lock().insert(b);
    store.fail_get.lock().insert(b);

    assert!(merge_event(&store, a, &MergeConfig::default()).await.is_err());

    store.fail_get.lock().clear();
    assert_eq!(store.get_event(a).await.unwrap().unwrap().weight, 8);
    assert_eq!(store.get_event(b).await.unwrap().unwrap().weight, 5);
    assert!(total_weight(&store, "fire").await >= 8);
}

#[tokio::test]
async fn lost_compare_and_swap_deletes_nothing() {
    let store = FlakyStore::new();
    let a = store.insert_event(ev_at(0.0, "fire", 1, 0)).await.unwrap();
    store.insert_event(ev_at(3.0, "fire", 1, 1)).await.unwrap();
    store.lose_cas.lock().insert(a);

    assert!(merge_event(&store, a, &MergeConfig::default()).await.is_err());
    assert!(store.deleted.lock().is_empty());
    assert_eq!(store.list_events().await.unwrap().len(), 2);
}

#[tokio::test]
async fn merge_failure_does_not_abort_the_sweep() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(ev_at(0.0, "flood", 1, 0)).await.unwrap();
    store.insert_event(ev_at(2.0, "flood", 1, 1)).await.unwrap();
    store.insert_event(ev_at(0.0, "derby", 2, 2)).await.unwrap();
    store.insert_event(ev_at(4.0, "derby", 3, 3)).await.unwrap();
    store.fail_near.lock().insert("flood".to_string());

    let driver = SweepDriver::new(store.clone(), SweepConfig::default());
    let report = driver.sweep_once(&Shutdown::never()).await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.merged, 1);
    assert_eq!(total_weight(store.as_ref(), "derby").await, 5);
    assert_eq!(store.list_events().await.unwrap().len(), 3);

    // retried on the next sweep once storage recovers
    store.fail_near.lock().clear();
    let report = driver.sweep_once(&Shutdown::never()).await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(report.merged, 1);
    assert_eq!(store.list_events().await.unwrap().len(), 2);
}

#[tokio::test]
async fn no_record_is_deleted_twice_in_a_sweep() {
    let store = Arc::new(FlakyStore::new());
    for i in 0..12 {
        store
            .insert_event(ev_at(i as f64 * 9.0, "parade", 1, i))
            .await
            .unwrap();
    }
    let driver = SweepDriver::new(store.clone(), SweepConfig::default());
    driver.sweep_once(&Shutdown::never()).await.unwrap();

    let deleted = store.deleted.lock().clone();
    let unique: HashSet<_> = deleted.iter().copied().collect();
    assert_eq!(unique.len(), deleted.len());
    for ev in store.list_events().await.unwrap() {
        assert!(!unique.contains(&ev.id));
    }
    assert_eq!(total_weight(store.as_ref(), "parade").await, 12);
}

#[tokio::test]
async fn snapshot_failure_fails_the_sweep_and_restores_idle() {
    let store = Arc::new(FlakyStore::new());
    *store.fail_list.lock() = 1;
    let driver = SweepDriver::new(store.clone(), SweepConfig::default());

    let err = driver.sweep_once(&Shutdown::never()).await.unwrap_err();
    assert!(format!("{err:#}").contains("snapshot"));
    assert_eq!(driver.state(), SweepState::Idle);

    assert!(driver.sweep_once(&Shutdown::never()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn run_loop_notifies_snapshot_failure_and_keeps_sweeping() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(ev_at(0.0, "storm", 2, 0)).await.unwrap();
    store.insert_event(ev_at(1.0, "storm", 2, 1)).await.unwrap();
    *store.fail_list.lock() = 1;

    let rec = Recording::default();
    let channels: Vec<Box<dyn Notifier>> = vec![Box::new(rec.clone())];
    let mux = Arc::new(NotifierMux::new(channels, 900));
    let driver = Arc::new(SweepDriver::new(store.clone(), fast_sweeps()).with_notifier(mux));

    let (trigger, sd) = shutdown::channel();
    let task = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.run(sd).await })
    };

    tokio::time::sleep(Duration::from_secs(2)).await;
    trigger.fire();
    task.await.unwrap();

    assert_eq!(*rec.0.lock(), vec!["sweep".to_string()]);
    assert_eq!(store.list_events().await.unwrap().len(), 1);
    assert_eq!(total_weight(store.as_ref(), "storm").await, 4);
    assert_eq!(driver.state(), SweepState::Idle);
}

#[tokio::test]
async fn vanished_snapshot_entries_are_skipped_not_visited() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(ev_at(0.0, "fog", 1, 0)).await.unwrap();
    let gone = store.insert_event(ev_at(100.0, "fog", 1, 1)).await.unwrap();
    let ghost = store.get_event(gone).await.unwrap().unwrap();
    store.delete_event(gone).await.unwrap();
    store.ghosts.lock().push(ghost);

    let driver = SweepDriver::new(store.clone(), SweepConfig::default());
    let report = driver.sweep_once(&Shutdown::never()).await.unwrap();
    assert_eq!(report.snapshot, 2);
    assert_eq!(report.visited, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn subscribers_see_sweeping_while_a_sweep_runs() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(ev_at(0.0, "fog", 1, 0)).await.unwrap();
    let driver = SweepDriver::new(store.clone(), SweepConfig::default());
    let mut rx = driver.subscribe();
    *store.state_rx.lock() = Some(driver.subscribe());

    driver.sweep_once(&Shutdown::never()).await.unwrap();

    assert_eq!(*store.states_seen.lock(), vec![SweepState::Sweeping]);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), SweepState::Idle);
}
