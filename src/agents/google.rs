// src/agents/google.rs
//! Google web-search adapter. There is no public API, so this scrapes the
//! results page with compiled regex selectors. When the structured selector
//! (anchor + h3 + snippet) comes up empty on a non-empty page, it falls back
//! to a cruder anchor-only extraction and reports the fetch as degraded.

use std::collections::BTreeMap;
use std::time::Duration;

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::agents::types::{is_absolute_url, Crawl, RawResult, SourceAdapter, SourceUnavailable};
use crate::agents::{cap_content, clean_fragment};
use crate::query::DateRange;

const SOURCE: &str = "google";
const RESULT_COUNT: u32 = 20;
const MAX_SNIPPET_CHARS: usize = 1_500;

pub struct GoogleAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl GoogleAdapter {
    pub fn from_env() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) issue-scout/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            mode: Mode::Http { client },
        }
    }

    /// Parse a saved results page instead of fetching; for tests.
    pub fn from_fixture(html: &str) -> Self {
        Self {
            mode: Mode::Fixture(html.to_string()),
        }
    }

    fn search_url(keywords: &[String], date_range: Option<&DateRange>) -> String {
        let q: String = keywords.join(" ");
        let mut url = format!(
            "https://www.google.com/search?q={}&num={}",
            urlencode(&q),
            RESULT_COUNT
        );
        if let Some(range) = date_range {
            // Custom date range filter, inclusive on both ends.
            url.push_str(&format!(
                "&tbs=cdr:1,cd_min:{},cd_max:{}",
                range.start().format("%m/%d/%Y"),
                range.end().format("%m/%d/%Y")
            ));
        }
        url
    }

    fn parse_page(html: &str) -> Crawl {
        let t0 = std::time::Instant::now();

        static RE_RESULT: OnceCell<Regex> = OnceCell::new();
        let re_result = RE_RESULT.get_or_init(|| {
            Regex::new(r#"(?is)<a[^>]+href="(?P<href>[^"]+)"[^>]*>\s*<h3[^>]*>(?P<title>.+?)</h3>"#)
                .expect("google result regex")
        });
        static RE_SNIPPET: OnceCell<Regex> = OnceCell::new();
        let re_snippet = RE_SNIPPET.get_or_init(|| {
            Regex::new(r#"(?is)<(?:span|div)[^>]*>(?P<text>[^<>]{40,400})</(?:span|div)>"#)
                .expect("google snippet regex")
        });

        let matches: Vec<_> = re_result.captures_iter(html).collect();
        let mut items = Vec::with_capacity(matches.len());
        for (idx, caps) in matches.iter().enumerate() {
            let href = caps.name("href").map(|m| m.as_str()).unwrap_or_default();
            let url = match normalize_href(href) {
                Some(u) => u,
                None => continue,
            };
            let title = clean_fragment(caps.name("title").map(|m| m.as_str()).unwrap_or_default());
            if title.is_empty() {
                continue;
            }

            // Snippet lives between this hit and the next one.
            let span_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let span_end = matches
                .get(idx + 1)
                .and_then(|c| c.get(0))
                .map(|m| m.start())
                .unwrap_or(html.len());
            let content = re_snippet
                .captures(&html[span_start..span_end])
                .and_then(|c| c.name("text"))
                .map(|m| cap_content(&clean_fragment(m.as_str()), MAX_SNIPPET_CHARS))
                .unwrap_or_default();

            let mut meta = BTreeMap::new();
            meta.insert("rank".to_string(), (items.len() + 1).to_string());
            items.push(RawResult {
                source: SOURCE.to_string(),
                title,
                url,
                content,
                published_at: None,
                source_metadata: meta,
            });
        }

        let crawl = if items.is_empty() && !html.trim().is_empty() {
            // Selector drift; salvage bare anchors so the query still yields
            // candidates, at lower confidence.
            Crawl::degraded(Self::parse_anchors(html), "anchor-only extraction")
        } else {
            Crawl::ok(items)
        };

        histogram!("crawl_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("crawl_results_total").increment(crawl.items.len() as u64);
        crawl
    }

    fn parse_anchors(html: &str) -> Vec<RawResult> {
        static RE_ANCHOR: OnceCell<Regex> = OnceCell::new();
        let re_anchor = RE_ANCHOR.get_or_init(|| {
            Regex::new(r#"(?is)<a[^>]+href="(?P<href>[^"]+)"[^>]*>(?P<text>.{10,200}?)</a>"#)
                .expect("google anchor regex")
        });

        let mut items = Vec::new();
        for caps in re_anchor.captures_iter(html) {
            let href = caps.name("href").map(|m| m.as_str()).unwrap_or_default();
            let url = match normalize_href(href) {
                Some(u) => u,
                None => continue,
            };
            let title = clean_fragment(caps.name("text").map(|m| m.as_str()).unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            items.push(RawResult {
                source: SOURCE.to_string(),
                title,
                url,
                content: String::new(),
                published_at: None,
                source_metadata: BTreeMap::new(),
            });
        }
        items
    }
}

/// Unwrap Google's `/url?q=...` redirect form and drop internal links.
fn normalize_href(href: &str) -> Option<String> {
    let url = if let Some(rest) = href.strip_prefix("/url?q=") {
        urldecode(rest.split('&').next().unwrap_or_default())
    } else {
        href.to_string()
    };
    if !is_absolute_url(&url) {
        return None;
    }
    let internal = ["google.com/search", "accounts.google", "webcache.googleusercontent"];
    if internal.iter().any(|frag| url.contains(frag)) {
        return None;
    }
    Some(url)
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                if let Ok(v) = u8::from_str_radix(hex, 16) {
                    out.push(v);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[async_trait::async_trait]
impl SourceAdapter for GoogleAdapter {
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
            Mode::Fixture(html) => Ok(Self::parse_page(html)),
            Mode::Http { client } => {
                let url = Self::search_url(keywords, date_range);
                let resp = client.get(&url).send().await.map_err(|e| {
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
                Ok(Self::parse_page(&body))
            }
        }
    }

    fn supports(&self, domain: &str) -> bool {
        domain.contains("google.com/search") || domain.contains("www.google.com")
    }
}
