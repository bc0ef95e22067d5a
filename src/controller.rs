// src/controller.rs
//! Query orchestration: resolves every requested source up front, fans the
//! crawl out to all adapters concurrently, and folds the outcomes into a
//! request-ordered bundle. Partial success is the normal case; one source
//! exhausting its retries never aborts its siblings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{info, warn};

use crate::agents::types::{RawResult, SourceAdapter, SourceUnavailable};
use crate::agents::AdapterRegistry;
use crate::error::RequestError;
use crate::query::{DateRange, Query};

#[derive(Debug, Clone)]
pub struct ControllerCfg {
    /// Budget for one adapter call; expiry is terminal for that source.
    pub source_timeout: Duration,
    /// Whole-query bound. Sources still in flight when it expires are
    /// aborted and reported as failed while completed ones are kept.
    pub outer_deadline: Option<Duration>,
    /// Attempts per source, retrying transient failures only.
    pub max_attempts: u32,
    /// First backoff delay; doubles per retry.
    pub retry_base: Duration,
    pub max_results_per_source: usize,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(30),
            outer_deadline: Some(Duration::from_secs(90)),
            max_attempts: 3,
            retry_base: Duration::from_millis(500),
            max_results_per_source: 100,
        }
    }
}

/// Terminal per-source outcome carried in the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FetchStatus {
    Ok,
    /// Successful fetch over a lower-confidence fallback path.
    Degraded(String),
    /// Retries exhausted, timed out, or aborted; results are empty and the
    /// reason is kept for observability.
    Failed(String),
}

impl FetchStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, FetchStatus::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FetchStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFetch {
    pub source: String,
    pub results: Vec<RawResult>,
    pub status: FetchStatus,
}

impl SourceFetch {
    fn failed(source: &str, reason: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            results: Vec::new(),
            status: FetchStatus::Failed(reason.into()),
        }
    }
}

/// Per-source raw results in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Bundle {
    pub sources: Vec<SourceFetch>,
}

impl Bundle {
    pub fn get(&self, source: &str) -> Option<&SourceFetch> {
        self.sources.iter().find(|s| s.source == source)
    }

    pub fn total_results(&self) -> usize {
        self.sources.iter().map(|s| s.results.len()).sum()
    }
}

pub struct Controller {
    registry: Arc<AdapterRegistry>,
    cfg: ControllerCfg,
}

impl Controller {
    pub fn new(registry: Arc<AdapterRegistry>, cfg: ControllerCfg) -> Self {
        Self { registry, cfg }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Dispatch the query to every requested source and collect a bundle.
    ///
    /// An unresolvable source name fails the whole call before any dispatch;
    /// runtime failures afterwards are contained per source.
    pub async fn run(&self, query: &Query) -> Result<Bundle, RequestError> {
        let mut resolved: Vec<(String, Arc<dyn SourceAdapter>)> =
            Vec::with_capacity(query.sources().len());
        for name in query.sources() {
            let adapter = self
                .registry
                .resolve(name)
                .ok_or_else(|| RequestError::UnknownSource(name.clone()))?;
            resolved.push((name.clone(), adapter));
        }

        counter!("controller_runs_total").increment(1);
        let deadline = self.cfg.outer_deadline.map(|d| Instant::now() + d);

        let mut handles: Vec<(String, JoinHandle<SourceFetch>)> =
            Vec::with_capacity(resolved.len());
        for (name, adapter) in resolved {
            let keywords = query.keywords().to_vec();
            let detail = query.detail().to_string();
            let range = query.date_range().copied();
            let cfg = self.cfg.clone();
            let handle = tokio::spawn(async move {
                fetch_with_retry(adapter, keywords, detail, range, cfg).await
            });
            handles.push((name, handle));
        }

        // Await in request order; completion order does not matter because
        // every task is already running.
        let mut sources = Vec::with_capacity(handles.len());
        for (name, mut handle) in handles {
            let fetch = if let Some(dl) = deadline {
                match timeout_at(dl, &mut handle).await {
                    Ok(join) => join_to_fetch(&name, join),
                    Err(_) => {
                        handle.abort();
                        counter!("crawl_failures_total").increment(1);
                        warn!(target: "controller", source = %name, "aborted at query deadline");
                        SourceFetch::failed(&name, "aborted at query deadline")
                    }
                }
            } else {
                join_to_fetch(&name, handle.await)
            };
            sources.push(fetch);
        }

        let bundle = Bundle { sources };
        info!(
            target: "controller",
            sources = bundle.sources.len(),
            results = bundle.total_results(),
            failed = bundle.sources.iter().filter(|s| s.status.is_failed()).count(),
            "query dispatch complete"
        );
        Ok(bundle)
    }
}

fn join_to_fetch(
    source: &str,
    join: Result<SourceFetch, tokio::task::JoinError>,
) -> SourceFetch {
    match join {
        Ok(fetch) => fetch,
        Err(e) => {
            counter!("crawl_failures_total").increment(1);
            SourceFetch::failed(source, format!("crawl task failed: {e}"))
        }
    }
}

async fn fetch_with_retry(
    adapter: Arc<dyn SourceAdapter>,
    keywords: Vec<String>,
    detail: String,
    range: Option<DateRange>,
    cfg: ControllerCfg,
) -> SourceFetch {
    let source = adapter.name();
    let mut delay = cfg.retry_base;
    let mut last_err: Option<SourceUnavailable> = None;

    for attempt in 1..=cfg.max_attempts.max(1) {
        let call = adapter.crawl(&keywords, &detail, range.as_ref());
        match timeout(cfg.source_timeout, call).await {
            // Timeout is terminal for the source: the in-flight call is
            // cancelled and no retry is attempted.
            Err(_) => {
                counter!("crawl_failures_total").increment(1);
                warn!(target: "controller", source, timeout = ?cfg.source_timeout, "crawl timed out");
                return SourceFetch::failed(
                    source,
                    format!("timed out after {:?}", cfg.source_timeout),
                );
            }
            Ok(Ok(crawl)) => {
                let kept = dedup_and_cap(crawl.items, cfg.max_results_per_source);
                let status = match crawl.degraded {
                    Some(reason) => {
                        counter!("crawl_degraded_total").increment(1);
                        FetchStatus::Degraded(reason)
                    }
                    None => FetchStatus::Ok,
                };
                info!(target: "controller", source, results = kept.len(), attempt, "crawl complete");
                return SourceFetch {
                    source: source.to_string(),
                    results: kept,
                    status,
                };
            }
            Ok(Err(err)) => {
                warn!(target: "controller", source, attempt, error = %err, "crawl attempt failed");
                last_err = Some(err);
                if attempt < cfg.max_attempts {
                    counter!("crawl_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    counter!("crawl_failures_total").increment(1);
    let reason = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "retries exhausted".to_string());
    SourceFetch::failed(source, reason)
}

/// Collapse duplicate (source, url) pairs keeping the first occurrence, then
/// cap the survivor count. Iteration order is stable.
fn dedup_and_cap(items: Vec<RawResult>, max: usize) -> Vec<RawResult> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let mut kept = Vec::with_capacity(items.len().min(max));
    for item in items {
        if !seen.insert(item.url.clone()) {
            counter!("crawl_dedup_total").increment(1);
            continue;
        }
        kept.push(item);
        if kept.len() == max {
            break;
        }
    }
    kept
}
