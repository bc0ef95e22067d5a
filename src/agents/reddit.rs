// src/agents/reddit.rs
//! Reddit search adapter. Prefers the authenticated OAuth API when client
//! credentials are configured; otherwise (or when the token exchange fails)
//! it falls back to the public `search.json` endpoint, which works without
//! auth but is rate-limited harder — that path reports a degraded fetch.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use tracing::warn;

use crate::agents::types::{is_absolute_url, Crawl, RawResult, SourceAdapter, SourceUnavailable};
use crate::agents::{cap_content, clean_fragment};
use crate::query::DateRange;

const SOURCE: &str = "reddit";
const PAGE_LIMIT: u32 = 50;
const MAX_BODY_CHARS: usize = 1_500;

const ENV_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";

pub struct RedditAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        credentials: Option<(String, String)>,
    },
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    subreddit: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl RedditAdapter {
    pub fn from_env() -> Self {
        let credentials = match (
            std::env::var(ENV_CLIENT_ID),
            std::env::var(ENV_CLIENT_SECRET),
        ) {
            (Ok(id), Ok(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        };
        let client = reqwest::Client::builder()
            .user_agent("issue-scout/0.1 (keyword issue digest)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            mode: Mode::Http {
                client,
                credentials,
            },
        }
    }

    /// Parse a saved listing payload instead of fetching; for tests.
    pub fn from_fixture(json: &str) -> Self {
        Self {
            mode: Mode::Fixture(json.to_string()),
        }
    }

    fn parse_listing(json: &str, date_range: Option<&DateRange>) -> Result<Vec<RawResult>, String> {
        let t0 = std::time::Instant::now();
        let listing: Listing = serde_json::from_str(json).map_err(|e| format!("json: {e}"))?;

        let mut items = Vec::with_capacity(listing.data.children.len());
        for child in listing.data.children {
            let post = child.data;
            let title = clean_fragment(&post.title);
            if title.is_empty() || post.permalink.is_empty() {
                continue;
            }
            let url = format!("https://www.reddit.com{}", post.permalink);
            if !is_absolute_url(&url) {
                continue;
            }
            let published_at = epoch_to_datetime(post.created_utc);
            if let (Some(range), Some(ts)) = (date_range, published_at) {
                if !range.contains(ts) {
                    continue;
                }
            }

            let mut meta = BTreeMap::new();
            meta.insert("score".to_string(), post.score.to_string());
            meta.insert("comments".to_string(), post.num_comments.to_string());
            if !post.subreddit.is_empty() {
                meta.insert("subreddit".to_string(), post.subreddit);
            }
            items.push(RawResult {
                source: SOURCE.to_string(),
                title,
                url,
                content: cap_content(&clean_fragment(&post.selftext), MAX_BODY_CHARS),
                published_at,
                source_metadata: meta,
            });
        }

        histogram!("crawl_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("crawl_results_total").increment(items.len() as u64);
        Ok(items)
    }

    async fn fetch_token(
        client: &reqwest::Client,
        id: &str,
        secret: &str,
    ) -> Result<String, String> {
        let resp = client
            .post("https://www.reddit.com/api/v1/access_token")
            .basic_auth(id, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| format!("token request: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("token status {}", resp.status()));
        }
        let token: TokenResponse = resp.json().await.map_err(|e| format!("token body: {e}"))?;
        Ok(token.access_token)
    }

    async fn fetch_authenticated(
        client: &reqwest::Client,
        token: &str,
        query: &str,
    ) -> Result<String, String> {
        let url = format!(
            "https://oauth.reddit.com/search?q={query}&limit={PAGE_LIMIT}&sort=new&type=link"
        );
        let resp = client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| format!("api request: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("api status {}", resp.status()));
        }
        resp.text().await.map_err(|e| format!("api body: {e}"))
    }

    async fn fetch_public(client: &reqwest::Client, query: &str) -> Result<String, String> {
        let url =
            format!("https://www.reddit.com/search.json?q={query}&limit={PAGE_LIMIT}&sort=new");
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("public request: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("public status {}", resp.status()));
        }
        resp.text().await.map_err(|e| format!("public body: {e}"))
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if secs <= 0.0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
}

#[async_trait::async_trait]
impl SourceAdapter for RedditAdapter {
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
                let items = Self::parse_listing(json, date_range)
                    .map_err(|e| SourceUnavailable::new(SOURCE, e))?;
                Ok(Crawl::ok(items))
            }
            Mode::Http {
                client,
                credentials,
            } => {
                let query: String = keywords
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join("+");

                if let Some((id, secret)) = credentials {
                    match Self::fetch_token(client, id, secret).await {
                        Ok(token) => match Self::fetch_authenticated(client, &token, &query).await
                        {
                            Ok(body) => {
                                let items = Self::parse_listing(&body, date_range)
                                    .map_err(|e| SourceUnavailable::new(SOURCE, e))?;
                                return Ok(Crawl::ok(items));
                            }
                            Err(reason) => {
                                warn!(target: "controller", source = SOURCE, %reason, "oauth search failed, trying public endpoint");
                            }
                        },
                        Err(reason) => {
                            warn!(target: "controller", source = SOURCE, %reason, "token exchange failed, trying public endpoint");
                        }
                    }
                }

                let body = Self::fetch_public(client, &query).await.map_err(|e| {
                    counter!("crawl_errors_total").increment(1);
                    SourceUnavailable::new(SOURCE, e)
                })?;
                let items = Self::parse_listing(&body, date_range)
                    .map_err(|e| SourceUnavailable::new(SOURCE, e))?;
                Ok(Crawl::degraded(items, "public search endpoint"))
            }
        }
    }

    fn supports(&self, domain: &str) -> bool {
        domain.contains("reddit.com")
    }
}
