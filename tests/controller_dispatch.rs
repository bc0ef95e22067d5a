// tests/controller_dispatch.rs
//! Orchestrator behavior: partial-failure isolation, retry policy, dedup,
//! ordering, and fail-fast source validation.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{query_for, raw, FakeAdapter};
use issue_scout::agents::AdapterRegistry;
use issue_scout::controller::{Controller, ControllerCfg, FetchStatus};
use issue_scout::error::RequestError;

fn controller_with(adapters: Vec<FakeAdapter>, cfg: ControllerCfg) -> Controller {
    let registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(Arc::new(adapter));
    }
    Controller::new(Arc::new(registry), cfg)
}

fn fast_cfg() -> ControllerCfg {
    ControllerCfg {
        source_timeout: Duration::from_secs(5),
        outer_deadline: Some(Duration::from_secs(30)),
        max_attempts: 3,
        retry_base: Duration::from_millis(100),
        ..ControllerCfg::default()
    }
}

#[tokio::test]
async fn unknown_source_fails_before_any_dispatch() {
    let healthy = FakeAdapter::new("google").with_items(vec![raw(
        "google",
        "t",
        "https://a.example",
        "",
    )]);
    let controller = controller_with(vec![healthy], fast_cfg());

    let query = query_for(&["rust"], &["google", "doesnotexist"]);
    let err = controller.run(&query).await.unwrap_err();
    assert_eq!(err, RequestError::UnknownSource("doesnotexist".into()));
}

#[tokio::test(start_paused = true)]
async fn timed_out_source_does_not_abort_siblings() {
    let slow = FakeAdapter::new("reddit")
        .with_items(vec![raw("reddit", "slow", "https://r.example", "")])
        .with_delay(Duration::from_secs(60));
    let healthy = FakeAdapter::new("google").with_items(vec![
        raw("google", "a", "https://a.example", ""),
        raw("google", "b", "https://b.example", ""),
    ]);
    let controller = controller_with(vec![slow, healthy], fast_cfg());

    let bundle = controller
        .run(&query_for(&["rust"], &["reddit", "google"]))
        .await
        .unwrap();

    let reddit = bundle.get("reddit").unwrap();
    assert!(reddit.results.is_empty());
    let reason = reddit.status.error().unwrap();
    assert!(reason.contains("timed out"), "got: {reason}");

    let google = bundle.get("google").unwrap();
    assert_eq!(google.status, FetchStatus::Ok);
    assert_eq!(google.results.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    let flaky = FakeAdapter::new("github")
        .with_items(vec![raw("github", "t", "https://g.example", "")])
        .failing_first(2);
    let controller = controller_with(vec![flaky], fast_cfg());

    let bundle = controller.run(&query_for(&["rust"], &["github"])).await.unwrap();
    let github = bundle.get("github").unwrap();
    assert_eq!(github.status, FetchStatus::Ok);
    assert_eq!(github.results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_keep_error_metadata() {
    let down = FakeAdapter::new("github").failing_first(u32::MAX);
    let controller = controller_with(vec![down], fast_cfg());

    let bundle = controller.run(&query_for(&["rust"], &["github"])).await.unwrap();
    let github = bundle.get("github").unwrap();
    assert!(github.results.is_empty());
    assert!(github.status.error().unwrap().contains("scripted outage"));
}

#[tokio::test]
async fn degraded_fetch_is_accepted_without_retry() {
    let adapter = FakeAdapter::new("reddit")
        .with_items(vec![raw("reddit", "t", "https://r.example", "")])
        .degraded("public search endpoint");
    let controller = controller_with(vec![adapter], fast_cfg());

    let query = query_for(&["rust"], &["reddit"]);
    let bundle = controller.run(&query).await.unwrap();

    let reddit = bundle.get("reddit").unwrap();
    assert_eq!(
        reddit.status,
        FetchStatus::Degraded("public search endpoint".into())
    );
    assert_eq!(
        reddit.results[0].source_metadata.get("degraded").map(String::as_str),
        Some("public search endpoint")
    );
}

#[tokio::test]
async fn duplicate_urls_collapse_to_first_occurrence() {
    let adapter = FakeAdapter::new("google").with_items(vec![
        raw("google", "first seen", "https://dup.example", "first content"),
        raw("google", "second copy", "https://dup.example", "other content"),
        raw("google", "distinct", "https://other.example", ""),
    ]);
    let controller = controller_with(vec![adapter], fast_cfg());

    let bundle = controller.run(&query_for(&["rust"], &["google"])).await.unwrap();
    let google = bundle.get("google").unwrap();
    assert_eq!(google.results.len(), 2);
    assert_eq!(google.results[0].content, "first content");
}

#[tokio::test]
async fn bundle_preserves_request_order() {
    let a = FakeAdapter::new("github").with_items(vec![raw("github", "g", "https://g.example", "")]);
    let b = FakeAdapter::new("google").with_items(vec![raw("google", "w", "https://w.example", "")]);
    let c = FakeAdapter::new("reddit").with_items(vec![raw("reddit", "r", "https://r.example", "")]);
    let controller = controller_with(vec![a, b, c], fast_cfg());

    let bundle = controller
        .run(&query_for(&["rust"], &["reddit", "github", "google"]))
        .await
        .unwrap();
    let order: Vec<&str> = bundle.sources.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(order, vec!["reddit", "github", "google"]);
}

#[tokio::test(start_paused = true)]
async fn outer_deadline_returns_completed_sources() {
    let cfg = ControllerCfg {
        source_timeout: Duration::from_secs(600),
        outer_deadline: Some(Duration::from_secs(10)),
        max_attempts: 1,
        ..ControllerCfg::default()
    };
    let stuck = FakeAdapter::new("reddit")
        .with_items(vec![raw("reddit", "late", "https://late.example", "")])
        .with_delay(Duration::from_secs(300));
    let healthy =
        FakeAdapter::new("google").with_items(vec![raw("google", "t", "https://a.example", "")]);
    let controller = controller_with(vec![stuck, healthy], cfg);

    let bundle = controller
        .run(&query_for(&["rust"], &["google", "reddit"]))
        .await
        .unwrap();

    assert_eq!(bundle.get("google").unwrap().results.len(), 1);
    let reddit = bundle.get("reddit").unwrap();
    assert!(reddit.status.error().unwrap().contains("deadline"));
}

#[tokio::test]
async fn per_source_cap_limits_results() {
    let cfg = ControllerCfg {
        max_results_per_source: 3,
        ..fast_cfg()
    };
    let items: Vec<_> = (0..10)
        .map(|i| raw("google", "t", &format!("https://x.example/{i}"), ""))
        .collect();
    let adapter = FakeAdapter::new("google").with_items(items);
    let controller = controller_with(vec![adapter], cfg);

    let bundle = controller.run(&query_for(&["rust"], &["google"])).await.unwrap();
    assert_eq!(bundle.get("google").unwrap().results.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_counts_each_attempt_once() {
    let flaky = FakeAdapter::new("github")
        .with_items(vec![raw("github", "t", "https://g.example", "")])
        .failing_first(1);
    let registry = AdapterRegistry::new();
    let flaky = Arc::new(flaky);
    registry.register(flaky.clone());
    let controller = Controller::new(Arc::new(registry), fast_cfg());

    controller.run(&query_for(&["rust"], &["github"])).await.unwrap();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
}
