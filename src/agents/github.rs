// src/agents/github.rs
//! GitHub issue-search adapter over the REST search API. A personal access
//! token (GITHUB_TOKEN) raises the rate limit; without one the same endpoint
//! still answers, so the unauthenticated path is reported as degraded rather
//! than failing the source.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::agents::types::{is_absolute_url, Crawl, RawResult, SourceAdapter, SourceUnavailable};
use crate::agents::{cap_content, clean_fragment};
use crate::query::DateRange;

const SOURCE: &str = "github";
const PAGE_LIMIT: u32 = 50;
const MAX_BODY_CHARS: usize = 1_500;

const ENV_TOKEN: &str = "GITHUB_TOKEN";

pub struct GithubAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        token: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    comments: i64,
    #[serde(default)]
    state: String,
}

impl GithubAdapter {
    pub fn from_env() -> Self {
        let token = std::env::var(ENV_TOKEN).ok().filter(|t| !t.is_empty());
        let client = reqwest::Client::builder()
            .user_agent("issue-scout/0.1 (keyword issue digest)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            mode: Mode::Http { client, token },
        }
    }

    /// Parse a saved search payload instead of fetching; for tests.
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
        }
    }

    fn search_url(keywords: &[String], date_range: Option<&DateRange>) -> String {
        let mut q: String = keywords.join(" ");
        if let Some(range) = date_range {
            q.push_str(&format!(
                " created:{}..{}",
                range.start().format("%Y-%m-%d"),
                range.end().format("%Y-%m-%d")
            ));
        }
        let encoded: String = q
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("+");
        format!(
            "https://api.github.com/search/issues?q={encoded}&sort=created&order=desc&per_page={PAGE_LIMIT}"
        )
    }

    fn parse_issues(json: &str) -> Result<Vec<RawResult>, String> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(json).map_err(|e| format!("json: {e}"))?;

        let mut items = Vec::with_capacity(resp.items.len());
        for issue in resp.items {
            let title = clean_fragment(&issue.title);
            if title.is_empty() || !is_absolute_url(&issue.html_url) {
                continue;
            }
            let mut meta = BTreeMap::new();
            meta.insert("comments".to_string(), issue.comments.to_string());
            if !issue.state.is_empty() {
                meta.insert("state".to_string(), issue.state);
            }
            items.push(RawResult {
                source: SOURCE.to_string(),
                title,
                url: issue.html_url,
                content: cap_content(
                    &clean_fragment(issue.body.as_deref().unwrap_or_default()),
                    MAX_BODY_CHARS,
                ),
                published_at: issue.created_at,
                source_metadata: meta,
            });
        }

        histogram!("crawl_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("crawl_results_total").increment(items.len() as u64);
        Ok(items)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GithubAdapter {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn crawl(
        &self,
        keywords: &[String],
        _detail: &str,
        date_range: Option<&DateRange>,
    ) -> Result<Crawl, SourceUnavailable> {
        match &self.mode {
            Mode::Fixture(json) => {
                let items =
                    Self::parse_issues(json).map_err(|e| SourceUnavailable::new(SOURCE, e))?;
                Ok(Crawl::ok(items))
            }
            Mode::Http { client, token } => {
                let url = Self::search_url(keywords, date_range);
                let mut req = client
                    .get(&url)
                    .header("Accept", "application/vnd.github+json");
                if let Some(token) = token {
                    req = req.bearer_auth(token);
                }
                let resp = req.send().await.map_err(|e| {
                    counter!("crawl_errors_total").increment(1);
                    SourceUnavailable::new(SOURCE, format!("http error: {e}"))
                })?;
                let status = resp.status();
                if !status.is_success() {
                    counter!("crawl_errors_total").increment(1);
                    return Err(SourceUnavailable::new(SOURCE, format!("http status {status}")));
                }
                let body = resp
                    .text()
                    .await
                    .map_err(|e| SourceUnavailable::new(SOURCE, format!("body read: {e}")))?;
                let items =
                    Self::parse_issues(&body).map_err(|e| SourceUnavailable::new(SOURCE, e))?;
                if token.is_some() {
                    Ok(Crawl::ok(items))
                } else {
                    Ok(Crawl::degraded(items, "unauthenticated search"))
                }
            }
        }
    }

    fn supports(&self, domain: &str) -> bool {
        domain.contains("github.com")
    }
}
