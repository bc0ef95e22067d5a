// tests/scheduler_runs.rs
//! Scheduler state machine: due-window idempotence, duplicate-notification
//! suppression across days, and last_run semantics on delivery failure.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use common::{query_for, raw, FakeAdapter, RecordingNotifier, ScriptedLlm};
use issue_scout::agents::AdapterRegistry;
use issue_scout::controller::{Controller, ControllerCfg};
use issue_scout::process::{PipelineCfg, ResultProcessor};
use issue_scout::subscribe::{
    MemoryStore, NotifyTime, Scheduler, SchedulerCfg, Subscription, SubscriptionStore,
};

fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().fixed_offset()
}

struct Harness {
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
    scheduler: Scheduler,
}

fn harness(adapter: FakeAdapter, notifier: RecordingNotifier) -> Harness {
    let registry = AdapterRegistry::new();
    registry.register(Arc::new(adapter));
    let controller = Arc::new(Controller::new(Arc::new(registry), ControllerCfg::default()));
    let llm = Arc::new(ScriptedLlm::new(vec![], "daily digest").with_fallback_score(8));
    let processor = Arc::new(ResultProcessor::new(llm, PipelineCfg::default()));
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(notifier);
    let scheduler = Scheduler::new(
        store.clone() as Arc<dyn SubscriptionStore>,
        controller,
        processor,
        notifier.clone(),
        SchedulerCfg::default(),
    );
    Harness {
        store,
        notifier,
        scheduler,
    }
}

async fn subscribe_at(store: &MemoryStore, time: &str) -> Subscription {
    let sub = Subscription::new(
        "user@example.com",
        query_for(&["rust"], &["google"]),
        NotifyTime::parse(time).unwrap(),
    )
    .unwrap();
    store.put(sub.clone()).await.unwrap();
    sub
}

/// Wait until the spawned subscription run has persisted `last_run`.
async fn wait_for_run(store: &MemoryStore, id: &str) -> Subscription {
    for _ in 0..200 {
        let subs = store.get("user@example.com").await.unwrap();
        if let Some(sub) = subs.iter().find(|s| s.id == id) {
            if sub.last_run.is_some() {
                return sub.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("subscription {id} never ran");
}

#[tokio::test]
async fn due_tick_runs_once_and_same_day_tick_is_noop() {
    let adapter = FakeAdapter::new("google").with_items(vec![raw(
        "google",
        "rust news",
        "https://a.example",
        "rust",
    )]);
    let h = harness(adapter, RecordingNotifier::new());
    let sub = subscribe_at(&h.store, "09:00").await;

    // 09:00 tick: transitions to Running, then Idle with last_run set.
    let dispatched = h.scheduler.tick(local(2024, 6, 1, 9, 0)).await;
    assert_eq!(dispatched, 1);
    let ran = wait_for_run(&h.store, &sub.id).await;
    assert_eq!(
        ran.last_run.unwrap(),
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    );
    assert_eq!(h.notifier.deliveries().len(), 1);

    // 09:01 same day: no transition.
    assert_eq!(h.scheduler.tick(local(2024, 6, 1, 9, 1)).await, 0);
    // A repeated 09:00 evaluation the same day is also a no-op.
    assert_eq!(h.scheduler.tick(local(2024, 6, 1, 9, 0)).await, 0);
    assert_eq!(h.notifier.deliveries().len(), 1);
}

#[tokio::test]
async fn wrong_minute_never_triggers() {
    let h = harness(FakeAdapter::new("google"), RecordingNotifier::new());
    subscribe_at(&h.store, "09:00").await;
    assert_eq!(h.scheduler.tick(local(2024, 6, 1, 8, 59)).await, 0);
    assert_eq!(h.scheduler.tick(local(2024, 6, 1, 21, 0)).await, 0);
}

#[tokio::test]
async fn next_day_delivers_only_unseen_items() {
    let adapter = FakeAdapter::new("google").with_items(vec![
        raw("google", "rust stable item", "https://stable.example", "rust"),
        raw("google", "rust evergreen item", "https://evergreen.example", "rust"),
    ]);
    let h = harness(adapter, RecordingNotifier::new());
    let sub = subscribe_at(&h.store, "09:00").await;

    h.scheduler.tick(local(2024, 6, 1, 9, 0)).await;
    wait_for_run(&h.store, &sub.id).await;
    assert_eq!(h.notifier.deliveries()[0].2.total_count, 2);

    // Same results the next day: everything already notified, nothing sent.
    h.scheduler.tick(local(2024, 6, 2, 9, 0)).await;
    let day2 = Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap();
    for _ in 0..200 {
        let ran = h.store.get("user@example.com").await.unwrap();
        if ran[0].last_run == Some(day2) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let ran = h.store.get("user@example.com").await.unwrap();
    assert_eq!(ran[0].last_run, Some(day2));
    assert_eq!(h.notifier.deliveries().len(), 1);
}

#[tokio::test]
async fn delivery_failure_still_advances_last_run() {
    let adapter = FakeAdapter::new("google").with_items(vec![raw(
        "google",
        "rust news",
        "https://a.example",
        "rust",
    )]);
    let h = harness(adapter, RecordingNotifier::failing());
    let sub = subscribe_at(&h.store, "09:00").await;

    h.scheduler.tick(local(2024, 6, 1, 9, 0)).await;
    let ran = wait_for_run(&h.store, &sub.id).await;
    assert!(ran.last_run.is_some());
    assert!(h.notifier.deliveries().is_empty());

    // No retry storm: the same due window does not re-fire.
    assert_eq!(h.scheduler.tick(local(2024, 6, 1, 9, 0)).await, 0);
}

#[tokio::test]
async fn manual_trigger_bypasses_due_check_and_returns_result() {
    let adapter = FakeAdapter::new("google").with_items(vec![raw(
        "google",
        "rust news",
        "https://a.example",
        "rust",
    )]);
    let h = harness(adapter, RecordingNotifier::new());
    let sub = subscribe_at(&h.store, "09:00").await;

    // Nowhere near 09:00, and still runs.
    let result = h
        .scheduler
        .trigger("user@example.com", &sub.id)
        .await
        .unwrap();
    assert_eq!(result.total_count, 1);
    assert_eq!(h.notifier.deliveries().len(), 1);

    let stored = h.store.get("user@example.com").await.unwrap();
    assert!(stored[0].last_run.is_some());
}

#[tokio::test]
async fn manual_trigger_unknown_id_is_not_found() {
    let h = harness(FakeAdapter::new("google"), RecordingNotifier::new());
    subscribe_at(&h.store, "09:00").await;
    let err = h
        .scheduler
        .trigger("user@example.com", "missing-id")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing-id"));
}

#[tokio::test]
async fn start_stop_lifecycle_shuts_down_cleanly() {
    let h = harness(FakeAdapter::new("google"), RecordingNotifier::new());
    let handle = h.scheduler.start();
    handle.stop().await;
}
