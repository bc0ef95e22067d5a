// src/llm/mod.rs
//! LLM collaborator contract used by the filtering pipeline: per-item
//! relevance scoring and digest summarization. Failures carry a
//! transient/permanent distinction so callers know what is worth retrying.

pub mod fallback;
pub mod providers;

use serde::Deserialize;
use thiserror::Error;

pub use fallback::FallbackLlm;
pub use providers::{AnthropicClient, GeminiClient};

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Network failure, rate limit, or a malformed response; retryable.
    #[error("transient llm failure: {0}")]
    Transient(String),
    /// Disabled client, missing key, or a request rejection; not retryable.
    #[error("llm unavailable: {0}")]
    Permanent(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }
}

#[derive(Debug, Clone)]
pub struct ScoreRequest<'a> {
    pub keywords: &'a [String],
    pub detail: &'a str,
    pub title: &'a str,
    pub content: &'a str,
}

/// Relevance verdict for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scored {
    /// 0..=10, clamped on parse.
    pub score: u8,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SummaryItem {
    pub source: String,
    pub title: String,
    pub score: u8,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SummaryRequest<'a> {
    pub keywords: &'a [String],
    pub detail: &'a str,
    pub total: usize,
    pub items: &'a [SummaryItem],
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn score(&self, req: &ScoreRequest<'_>) -> Result<Scored, LlmError>;
    async fn summarize(&self, req: &SummaryRequest<'_>) -> Result<String, LlmError>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Always answers `Permanent`; used when no provider is configured. The
/// pipeline then skips stage 3 entirely, leaving the result set unscored.
pub struct DisabledLlm;

#[async_trait::async_trait]
impl LlmClient for DisabledLlm {
    async fn score(&self, _req: &ScoreRequest<'_>) -> Result<Scored, LlmError> {
        Err(LlmError::Permanent("llm disabled".into()))
    }

    async fn summarize(&self, _req: &SummaryRequest<'_>) -> Result<String, LlmError> {
        Err(LlmError::Permanent("llm disabled".into()))
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Model output often arrives wrapped in markdown fences or prose; cut the
/// payload down to the outermost JSON object/array before parsing.
pub(crate) fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let body = if let Some(rest) = trimmed.split("```json").nth(1) {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some(rest) = trimmed.split("```").nth(1) {
        rest.split("```").next().unwrap_or(rest)
    } else {
        trimmed
    };
    let start = body.find(['{', '['])?;
    let close = match body.as_bytes()[start] {
        b'{' => '}',
        _ => ']',
    };
    let end = body.rfind(close)?;
    if end < start {
        return None;
    }
    Some(body[start..=end].trim())
}

/// Parse a `{"score": n, "reason": "..."}` verdict, clamping to 0..=10.
pub(crate) fn parse_scored(text: &str) -> Result<Scored, String> {
    #[derive(Deserialize)]
    struct Verdict {
        score: f64,
        #[serde(default)]
        reason: String,
    }
    let json = extract_json(text).ok_or_else(|| format!("no json in response: {text:.60}"))?;
    let verdict: Verdict = serde_json::from_str(json).map_err(|e| format!("verdict parse: {e}"))?;
    let score = verdict.score.clamp(0.0, 10.0).round() as u8;
    Ok(Scored {
        score,
        reason: verdict.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_handles_fences_and_prose() {
        assert_eq!(
            extract_json("```json\n{\"score\": 7}\n```"),
            Some("{\"score\": 7}")
        );
        assert_eq!(
            extract_json("Here you go: {\"score\": 3, \"reason\": \"x\"} hope it helps"),
            Some("{\"score\": 3, \"reason\": \"x\"}")
        );
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn parse_scored_clamps_range() {
        let s = parse_scored("{\"score\": 14, \"reason\": \"over\"}").unwrap();
        assert_eq!(s.score, 10);
        let s = parse_scored("{\"score\": -2}").unwrap();
        assert_eq!(s.score, 0);
        assert!(s.reason.is_empty());
    }

    #[tokio::test]
    async fn disabled_client_is_permanent() {
        let err = DisabledLlm
            .score(&ScoreRequest {
                keywords: &[],
                detail: "",
                title: "",
                content: "",
            })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
