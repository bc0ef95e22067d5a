// src/agents/types.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::DateRange;

/// One discovered item from exactly one source, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResult {
    pub source: String,
    pub title: String,
    pub url: String,
    /// Snippet or body text; may be empty when the source exposes none.
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Source-specific extras (score, comment count, subreddit, ...). Opaque
    /// to the pipeline; the degraded marker also lands here.
    #[serde(default)]
    pub source_metadata: BTreeMap<String, String>,
}

impl RawResult {
    /// Dedup identity within a bundle: (source, url).
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.source, &self.url)
    }
}

/// Key under which adapters record a degraded fetch on each item.
pub const META_DEGRADED: &str = "degraded";

/// Accept only absolute http(s) URLs; everything else is dropped at parse time.
pub fn is_absolute_url(url: &str) -> bool {
    let rest = match url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    {
        Some(r) => r,
        None => return false,
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    !host.is_empty() && !host.contains(char::is_whitespace)
}

/// Outcome of a successful crawl. `degraded` is set when the adapter had to
/// use a lower-confidence path (public endpoint instead of an authenticated
/// API); the controller accepts it immediately without retry.
#[derive(Debug, Clone, Default)]
pub struct Crawl {
    pub items: Vec<RawResult>,
    pub degraded: Option<String>,
}

impl Crawl {
    pub fn ok(items: Vec<RawResult>) -> Self {
        Self {
            items,
            degraded: None,
        }
    }

    pub fn degraded(mut items: Vec<RawResult>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        for item in &mut items {
            item.source_metadata
                .insert(META_DEGRADED.to_string(), reason.clone());
        }
        Self {
            items,
            degraded: Some(reason),
        }
    }
}

/// Transient, source-scoped failure (network, HTTP 5xx/429, auth). The
/// controller retries these with backoff; zero results is NOT an error.
#[derive(Debug, Clone)]
pub struct SourceUnavailable {
    pub source: String,
    pub reason: String,
}

impl std::fmt::Display for SourceUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source `{}` unavailable: {}", self.source, self.reason)
    }
}

impl std::error::Error for SourceUnavailable {}

impl SourceUnavailable {
    pub fn new(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            reason: reason.into(),
        }
    }
}

/// Capability contract every source adapter implements. Adapters are selected
/// by tag through the registry, never by concrete type.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable lowercase identifier; every produced item is tagged with it.
    fn name(&self) -> &'static str;

    /// Fetch candidate items for the keywords. Finite, re-executes the
    /// underlying fetch on every call.
    async fn crawl(
        &self,
        keywords: &[String],
        detail: &str,
        date_range: Option<&DateRange>,
    ) -> Result<Crawl, SourceUnavailable>;

    /// Whether a URL belongs to this adapter's domain allow-list. Used by the
    /// dynamic-registration path when routing an unseen domain.
    fn supports(&self, domain: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_url_check() {
        assert!(is_absolute_url("https://example.com/a?b=1"));
        assert!(is_absolute_url("http://example.com"));
        assert!(!is_absolute_url("/relative/path"));
        assert!(!is_absolute_url("ftp://example.com"));
        assert!(!is_absolute_url("https://"));
        assert!(!is_absolute_url("https://bad host/x"));
    }

    #[test]
    fn degraded_crawl_marks_metadata() {
        let items = vec![RawResult {
            source: "reddit".into(),
            title: "t".into(),
            url: "https://example.com".into(),
            content: String::new(),
            published_at: None,
            source_metadata: BTreeMap::new(),
        }];
        let crawl = Crawl::degraded(items, "public endpoint");
        assert_eq!(crawl.degraded.as_deref(), Some("public endpoint"));
        assert_eq!(
            crawl.items[0].source_metadata.get(META_DEGRADED).map(String::as_str),
            Some("public endpoint")
        );
    }
}
