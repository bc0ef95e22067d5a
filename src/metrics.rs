// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration so every series shows up on /metrics.
pub fn describe_all() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("controller_runs_total", "Queries dispatched to adapters.");
        describe_counter!("crawl_results_total", "Raw items parsed from sources.");
        describe_counter!("crawl_errors_total", "Source fetch/parse errors.");
        describe_counter!("crawl_retries_total", "Transient source failures retried.");
        describe_counter!("crawl_failures_total", "Sources that ended a query failed.");
        describe_counter!("crawl_degraded_total", "Fetches served by a fallback path.");
        describe_counter!("crawl_dedup_total", "Items collapsed by (source, url) dedup.");
        describe_histogram!("crawl_parse_ms", "Source payload parse time in milliseconds.");
        describe_counter!("filter_candidates_total", "Items surviving the rule stages.");
        describe_counter!("filter_scored_total", "Items scored by the LLM stage.");
        describe_counter!(
            "filter_gate_skips_total",
            "Pipeline runs that skipped scoring over the candidate gate."
        );
        describe_counter!("llm_score_failures_total", "Scoring calls that failed.");
        describe_counter!("llm_retries_total", "Transient LLM failures retried.");
        describe_counter!("llm_failover_total", "Failovers to the secondary LLM.");
        describe_counter!("summary_failures_total", "Summaries degraded to empty.");
        describe_counter!("scheduler_runs_total", "Due subscription runs dispatched.");
        describe_counter!("scheduler_run_failures_total", "Subscription runs that failed.");
        describe_counter!(
            "scheduler_delivery_failures_total",
            "Digest deliveries that failed."
        );
        describe_counter!("scheduler_store_errors_total", "Subscription store errors.");
        describe_counter!("notify_sent_total", "Digest emails sent.");
        describe_counter!("notify_failures_total", "Digest emails that failed to send.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register all series.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        describe_all();
        Self { handle }
    }

    /// Router exposing `/metrics` in Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
