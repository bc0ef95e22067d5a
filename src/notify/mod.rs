// src/notify/mod.rs
//! Delivery contract for filtered digests plus rendering helpers. The core
//! only needs `send`; the transport (SMTP here) is an implementation detail.

pub mod email;

use thiserror::Error;
use tracing::info;

use crate::process::FilteredResult;

pub use email::EmailSender;

#[derive(Debug, Clone, Error)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryFailure(pub String);

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &FilteredResult,
    ) -> Result<(), DeliveryFailure>;
}

/// Logs instead of delivering. Used when no SMTP transport is configured, so
/// local runs still show what would have been sent.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &FilteredResult,
    ) -> Result<(), DeliveryFailure> {
        info!(
            target: "subscribe",
            recipient,
            subject,
            results = body.total_count,
            "notification (log only)"
        );
        Ok(())
    }
}

/// Subject line for a digest delivery.
pub fn digest_subject(keywords: &[String], total: usize) -> String {
    format!("{total} new issues: {}", keywords.join(", "))
}

/// Plain-text digest body: summary first, then per-source items with score,
/// url and reason.
pub fn render_digest(result: &FilteredResult) -> String {
    let mut out = String::new();
    if !result.summary.is_empty() {
        out.push_str(&result.summary);
        out.push_str("\n\n");
    }
    for source in &result.results_by_source {
        out.push_str(&format!(
            "== {} ({} results) ==\n",
            source.source,
            source.results.len()
        ));
        for item in &source.results {
            out.push_str(&format!(
                "[{}/10] {}\n    {}\n",
                item.relevance_score, item.raw.title, item.raw.url
            ));
            if !item.relevance_reason.is_empty() {
                out.push_str(&format!("    {}\n", item.relevance_reason));
            }
        }
        out.push('\n');
    }
    if result.total_count == 0 {
        out.push_str("No new results matched your criteria.\n");
    }
    out
}
