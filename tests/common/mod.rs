// tests/common/mod.rs
//! Shared fakes for integration tests: a scriptable source adapter, a
//! scripted LLM and a recording notifier.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use issue_scout::agents::types::{Crawl, RawResult, SourceAdapter, SourceUnavailable};
use issue_scout::llm::{LlmClient, LlmError, ScoreRequest, Scored, SummaryRequest};
use issue_scout::notify::{DeliveryFailure, Notifier};
use issue_scout::process::FilteredResult;
use issue_scout::query::{DateRange, Query};

pub fn raw(source: &str, title: &str, url: &str, content: &str) -> RawResult {
    RawResult {
        source: source.into(),
        title: title.into(),
        url: url.into(),
        content: content.into(),
        published_at: None,
        source_metadata: BTreeMap::new(),
    }
}

pub fn query_for(keywords: &[&str], sources: &[&str]) -> Query {
    Query::new(
        keywords.iter().map(|s| s.to_string()).collect(),
        sources.iter().map(|s| s.to_string()).collect(),
        "",
        None,
    )
    .unwrap()
}

/// Scriptable adapter: optional delay, N leading failures, degraded marker.
pub struct FakeAdapter {
    name: &'static str,
    items: Vec<RawResult>,
    degraded: Option<&'static str>,
    fail_first: u32,
    delay: Option<Duration>,
    pub calls: AtomicU32,
}

impl FakeAdapter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: Vec::new(),
            degraded: None,
            fail_first: 0,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_items(mut self, items: Vec<RawResult>) -> Self {
        self.items = items;
        self
    }

    pub fn degraded(mut self, reason: &'static str) -> Self {
        self.degraded = Some(reason);
        self
    }

    /// Fail the first `n` crawl calls with a transient error.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl SourceAdapter for FakeAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn crawl(
        &self,
        _keywords: &[String],
        _detail: &str,
        _date_range: Option<&DateRange>,
    ) -> Result<Crawl, SourceUnavailable> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.fail_first {
            return Err(SourceUnavailable::new(self.name, "scripted outage"));
        }
        match self.degraded {
            Some(reason) => Ok(Crawl::degraded(self.items.clone(), reason)),
            None => Ok(Crawl::ok(self.items.clone())),
        }
    }

    fn supports(&self, domain: &str) -> bool {
        domain.contains(self.name)
    }
}

/// Scores by substring lookup against the item title; unknown titles get the
/// fallback score. Summaries are fixed.
pub struct ScriptedLlm {
    scores: Vec<(&'static str, u8)>,
    fallback_score: Option<u8>,
    summary: &'static str,
    pub score_calls: AtomicU32,
}

impl ScriptedLlm {
    pub fn new(scores: Vec<(&'static str, u8)>, summary: &'static str) -> Self {
        Self {
            scores,
            fallback_score: None,
            summary,
            score_calls: AtomicU32::new(0),
        }
    }

    pub fn with_fallback_score(mut self, score: u8) -> Self {
        self.fallback_score = Some(score);
        self
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn score(&self, req: &ScoreRequest<'_>) -> Result<Scored, LlmError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        let hit = self
            .scores
            .iter()
            .find(|(frag, _)| req.title.contains(frag))
            .map(|(_, s)| *s)
            .or(self.fallback_score);
        match hit {
            Some(score) => Ok(Scored {
                score,
                reason: format!("scripted verdict {score}"),
            }),
            None => Err(LlmError::Permanent("no script entry".into())),
        }
    }

    async fn summarize(&self, _req: &SummaryRequest<'_>) -> Result<String, LlmError> {
        Ok(self.summary.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Captures every delivery; optionally fails them all.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, FilteredResult)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn deliveries(&self) -> Vec<(String, String, FilteredResult)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &FilteredResult,
    ) -> Result<(), DeliveryFailure> {
        if self.fail {
            return Err(DeliveryFailure("scripted smtp outage".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), subject.to_string(), body.clone()));
        Ok(())
    }
}
