// src/subscribe/scheduler.rs
//! Background tick loop over the subscription store. Every tick asks the
//! store for due subscriptions and runs each on its own task, so one slow
//! run never delays the next tick. A run always advances `last_run`, even
//! when crawling or delivery failed; redelivery goes through the manual
//! trigger path instead of a retry storm.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, Utc};
use metrics::counter;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::store::{StoreError, SubscriptionStore};
use super::Subscription;
use crate::controller::Controller;
use crate::notify::{digest_subject, Notifier};
use crate::process::{FilteredResult, ResultProcessor, SourceResults};

#[derive(Debug, Clone)]
pub struct SchedulerCfg {
    pub tick: Duration,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("no subscription `{id}` for `{email}`")]
    NotFound { email: String, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cheap-to-clone handle; all clones share one scheduler state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn SubscriptionStore>,
    controller: Arc<Controller>,
    processor: Arc<ResultProcessor>,
    notifier: Arc<dyn Notifier>,
    cfg: SchedulerCfg,
    /// Per-subscription digests of already-notified items. In-process only;
    /// a restart may redeliver once, which at-least-once delivery allows.
    seen: Mutex<HashMap<String, HashSet<String>>>,
    /// Subscriptions currently running, so overlapping ticks cannot
    /// double-trigger one record.
    in_flight: Mutex<HashSet<String>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        controller: Arc<Controller>,
        processor: Arc<ResultProcessor>,
        notifier: Arc<dyn Notifier>,
        cfg: SchedulerCfg,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                controller,
                processor,
                notifier,
                cfg,
                seen: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Spawn the tick loop. The returned handle owns the lifecycle; dropping
    /// it without `stop` leaves the loop running detached.
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.inner.cfg.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(target: "subscribe", tick = ?scheduler.inner.cfg.tick, "scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Local::now().fixed_offset();
                        scheduler.tick(now).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!(target: "subscribe", "scheduler stopped");
        });
        SchedulerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// One due-check pass. Public so tests can drive the clock themselves.
    /// Returns how many subscription runs were dispatched.
    pub async fn tick(&self, now: DateTime<FixedOffset>) -> usize {
        let due = match self.inner.store.list_due(now).await {
            Ok(due) => due,
            Err(e) => {
                counter!("scheduler_store_errors_total").increment(1);
                error!(target: "subscribe", error = %e, "due listing failed, tick skipped");
                return 0;
            }
        };

        let mut dispatched = 0;
        for sub in due {
            {
                let mut in_flight = self
                    .inner
                    .in_flight
                    .lock()
                    .expect("in-flight lock poisoned");
                if !in_flight.insert(sub.id.clone()) {
                    continue;
                }
            }
            dispatched += 1;
            counter!("scheduler_runs_total").increment(1);
            let this = self.clone();
            tokio::spawn(async move {
                let id = sub.id.clone();
                this.run_due(sub, now.with_timezone(&Utc)).await;
                this.inner
                    .in_flight
                    .lock()
                    .expect("in-flight lock poisoned")
                    .remove(&id);
            });
        }
        dispatched
    }

    /// Scheduled run: crawl, filter, suppress already-seen items, deliver,
    /// then advance `last_run` unconditionally.
    async fn run_due(&self, sub: Subscription, now: DateTime<Utc>) {
        info!(target: "subscribe", id = %sub.id, email = %sub.email, "subscription due");

        match self.execute(&sub).await {
            Some(result) => {
                let fresh = self.retain_unseen(&sub.id, result);
                if fresh.total_count > 0 {
                    self.deliver(&sub, &fresh).await;
                } else {
                    info!(target: "subscribe", id = %sub.id, "no new results, nothing delivered");
                }
            }
            None => {
                counter!("scheduler_run_failures_total").increment(1);
            }
        }

        self.mark_ran(sub, now).await;
    }

    /// Manual run for the test/retrigger path: bypasses the due-check and
    /// the seen-set, delivers best-effort, returns the full result. The
    /// `last_run` update follows normal run completion.
    pub async fn trigger(&self, email: &str, id: &str) -> Result<FilteredResult, TriggerError> {
        let sub = self
            .inner
            .store
            .find(email, id)
            .await?
            .ok_or_else(|| TriggerError::NotFound {
                email: email.to_string(),
                id: id.to_string(),
            })?;

        let result = self.execute(&sub).await.unwrap_or_default();
        if result.total_count > 0 {
            self.deliver(&sub, &result).await;
        }
        self.mark_ran(sub, Utc::now()).await;
        Ok(result)
    }

    /// Orchestrate + filter one subscription query. `None` means the
    /// controller rejected the query (a source has been unregistered since
    /// the subscription was created).
    async fn execute(&self, sub: &Subscription) -> Option<FilteredResult> {
        match self.inner.controller.run(&sub.query).await {
            Ok(bundle) => Some(self.inner.processor.process(&sub.query, &bundle).await),
            Err(e) => {
                warn!(target: "subscribe", id = %sub.id, error = %e, "subscription query rejected");
                None
            }
        }
    }

    async fn deliver(&self, sub: &Subscription, result: &FilteredResult) {
        let subject = digest_subject(sub.query.keywords(), result.total_count);
        match self.inner.notifier.send(&sub.email, &subject, result).await {
            Ok(()) => {
                self.mark_seen(&sub.id, result);
                info!(
                    target: "subscribe",
                    id = %sub.id,
                    results = result.total_count,
                    "digest delivered"
                );
            }
            Err(e) => {
                counter!("scheduler_delivery_failures_total").increment(1);
                warn!(target: "subscribe", id = %sub.id, error = %e, "delivery failed");
            }
        }
    }

    async fn mark_ran(&self, mut sub: Subscription, now: DateTime<Utc>) {
        sub.last_run = Some(now);
        if let Err(e) = self.inner.store.put(sub.clone()).await {
            counter!("scheduler_store_errors_total").increment(1);
            error!(target: "subscribe", id = %sub.id, error = %e, "failed to persist last_run");
        }
    }

    /// Drop items this subscription was already notified about and rebuild
    /// the counts around the survivors.
    fn retain_unseen(&self, sub_id: &str, result: FilteredResult) -> FilteredResult {
        let seen = self.inner.seen.lock().expect("seen lock poisoned");
        let Some(known) = seen.get(sub_id) else {
            return result;
        };

        let mut results_by_source = Vec::with_capacity(result.results_by_source.len());
        for source in result.results_by_source {
            let fresh: Vec<_> = source
                .results
                .into_iter()
                .filter(|r| !known.contains(&item_digest(&r.raw.source, &r.raw.url)))
                .collect();
            if !fresh.is_empty() {
                results_by_source.push(SourceResults {
                    source: source.source,
                    results: fresh,
                });
            }
        }
        let total_count = results_by_source.iter().map(|s| s.results.len()).sum();
        FilteredResult {
            results_by_source,
            total_count,
            summary: result.summary,
        }
    }

    fn mark_seen(&self, sub_id: &str, result: &FilteredResult) {
        let mut seen = self.inner.seen.lock().expect("seen lock poisoned");
        let known = seen.entry(sub_id.to_string()).or_default();
        for source in &result.results_by_source {
            for item in &source.results {
                known.insert(item_digest(&item.raw.source, &item.raw.url));
            }
        }
    }
}

/// Stable digest of one delivered item, keyed by (source, url).
fn item_digest(source: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_digest_is_stable_and_pair_sensitive() {
        let a = item_digest("google", "https://a.example");
        assert_eq!(a, item_digest("google", "https://a.example"));
        assert_ne!(a, item_digest("reddit", "https://a.example"));
        assert_eq!(a.len(), 16);
    }
}
