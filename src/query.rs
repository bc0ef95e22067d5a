// src/query.rs
//! Validated user query: keywords, target sources, a free-text detail hint
//! and an optional inclusive date range. Instances are immutable after
//! construction; the only way in is the validating constructor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Inclusive date bounds for a search period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, RequestError> {
        if end < start {
            return Err(RequestError::DateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Wire shape accepted from clients and subscriptions; validated into [`Query`].
#[derive(Debug, Clone, Deserialize)]
pub struct QueryDraft {
    pub keywords: Vec<String>,
    pub sources: Vec<String>,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub date_range: Option<DateRangeDraft>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DateRangeDraft {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QueryDraft")]
pub struct Query {
    keywords: Vec<String>,
    sources: Vec<String>,
    detail: String,
    date_range: Option<DateRange>,
}

impl Query {
    /// Validate and normalize the raw inputs.
    ///
    /// Keywords are trimmed and deduplicated case-insensitively, keeping the
    /// first occurrence and its casing. Source names are lowercased (registry
    /// keys are lowercase) and deduplicated, order preserved in both cases.
    pub fn new(
        keywords: Vec<String>,
        sources: Vec<String>,
        detail: impl Into<String>,
        date_range: Option<DateRange>,
    ) -> Result<Self, RequestError> {
        let mut kept_keywords: Vec<String> = Vec::with_capacity(keywords.len());
        for kw in keywords {
            let kw = kw.trim();
            if kw.is_empty() {
                continue;
            }
            let dup = kept_keywords.iter().any(|k| k.eq_ignore_ascii_case(kw));
            if !dup {
                kept_keywords.push(kw.to_string());
            }
        }
        if kept_keywords.is_empty() {
            return Err(RequestError::NoKeywords);
        }

        let mut kept_sources: Vec<String> = Vec::with_capacity(sources.len());
        for src in sources {
            let src = src.trim().to_ascii_lowercase();
            if src.is_empty() {
                continue;
            }
            if !kept_sources.contains(&src) {
                kept_sources.push(src);
            }
        }
        if kept_sources.is_empty() {
            return Err(RequestError::NoSources);
        }

        Ok(Self {
            keywords: kept_keywords,
            sources: kept_sources,
            detail: detail.into().trim().to_string(),
            date_range,
        })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }
}

impl TryFrom<QueryDraft> for Query {
    type Error = RequestError;

    fn try_from(draft: QueryDraft) -> Result<Self, Self::Error> {
        let range = draft
            .date_range
            .map(|r| DateRange::new(r.start, r.end))
            .transpose()?;
        Query::new(draft.keywords, draft.sources, draft.detail, range)
    }
}
