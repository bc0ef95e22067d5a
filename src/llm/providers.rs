// src/llm/providers.rs
//! Concrete LLM providers over reqwest: Gemini (generateContent) and
//! Anthropic (messages). Both speak the same scoring/summary prompts and
//! classify HTTP outcomes into transient vs permanent failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{parse_scored, LlmClient, LlmError, ScoreRequest, Scored, SummaryRequest};

const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";
const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-lite";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

const PROMPT_CONTENT_CAP: usize = 1_500;

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("issue-scout/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(30))
        .build()
        .expect("reqwest client")
}

fn classify_status(status: reqwest::StatusCode) -> LlmError {
    if status.as_u16() == 429 || status.is_server_error() {
        LlmError::Transient(format!("http status {status}"))
    } else {
        LlmError::Permanent(format!("http status {status}"))
    }
}

fn score_prompt(req: &ScoreRequest<'_>) -> String {
    let content: String = req.content.chars().take(PROMPT_CONTENT_CAP).collect();
    format!(
        "You are filtering search results for a user.\n\
         User's keywords: {keywords}\n\
         User's preferences: \"{detail}\"\n\n\
         Score this result from 0-10 for relevance to the keywords and preferences.\n\
         Title: {title}\n\
         Content: {content}\n\n\
         Scoring guide:\n\
         - 8-10: highly relevant to the keywords AND matches the preferences\n\
         - 5-7: relevant to the keywords but not a full preference match\n\
         - 0-4: not relevant or contradicts the preferences\n\
         If the preferences are empty, judge keyword relevance only.\n\n\
         Return ONLY a JSON object: {{\"score\": <0-10>, \"reason\": \"brief reason\"}}",
        keywords = req.keywords.join(", "),
        detail = req.detail,
        title = req.title,
    )
}

fn summary_prompt(req: &SummaryRequest<'_>) -> String {
    let mut listing = String::new();
    for item in req.items {
        listing.push_str(&format!(
            "- [{}] {} (score {}): {}\n",
            item.source, item.title, item.score, item.reason
        ));
    }
    format!(
        "Generate a concise summary of search results.\n\
         User's keywords: {keywords}\n\
         User's preferences: \"{detail}\"\n\
         Results found: {total} relevant items.\n\n\
         Top results:\n{listing}\n\
         Write 2-3 sentences highlighting the most relevant findings, which \
         sources had the best results, and any recurring themes. \
         Return ONLY the summary text.",
        keywords = req.keywords.join(", "),
        detail = req.detail,
        total = req.total,
    )
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model_override.unwrap_or(DEFAULT_GEMINI_MODEL).to_string(),
        }
    }

    pub fn from_env(model_override: Option<&str>) -> Option<Self> {
        let key = std::env::var(ENV_GEMINI_KEY).ok().filter(|k| !k.is_empty())?;
        Some(Self::new(key, model_override))
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            #[serde(rename = "generationConfig")]
            generation_config: GenConfig,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct GenConfig {
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            #[serde(default)]
            text: String,
        }

        if self.api_key.is_empty() {
            return Err(LlmError::Permanent("missing gemini api key".into()));
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenConfig { temperature: 0.1 },
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(format!("request: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status()));
        }
        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::Transient(format!("body: {e}")))?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::Transient("empty completion".into()));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    async fn score(&self, req: &ScoreRequest<'_>) -> Result<Scored, LlmError> {
        let text = self.generate(&score_prompt(req)).await?;
        parse_scored(&text).map_err(LlmError::Transient)
    }

    async fn summarize(&self, req: &SummaryRequest<'_>) -> Result<String, LlmError> {
        let text = self.generate(&summary_prompt(req)).await?;
        Ok(text.trim().to_string())
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// Anthropic
// ------------------------------------------------------------

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model_override
                .unwrap_or(DEFAULT_ANTHROPIC_MODEL)
                .to_string(),
        }
    }

    pub fn from_env(model_override: Option<&str>) -> Option<Self> {
        let key = std::env::var(ENV_ANTHROPIC_KEY)
            .ok()
            .filter(|k| !k.is_empty())?;
        Some(Self::new(key, model_override))
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(default)]
            text: String,
        }

        if self.api_key.is_empty() {
            return Err(LlmError::Permanent("missing anthropic api key".into()));
        }

        let body = Req {
            model: &self.model,
            max_tokens: 512,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(format!("request: {e}")))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status()));
        }
        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::Transient(format!("body: {e}")))?;
        let text = parsed
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<String>();
        if text.is_empty() {
            return Err(LlmError::Transient("empty completion".into()));
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    async fn score(&self, req: &ScoreRequest<'_>) -> Result<Scored, LlmError> {
        let text = self.complete(&score_prompt(req)).await?;
        parse_scored(&text).map_err(LlmError::Transient)
    }

    async fn summarize(&self, req: &SummaryRequest<'_>) -> Result<String, LlmError> {
        let text = self.complete(&summary_prompt(req)).await?;
        Ok(text.trim().to_string())
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_prompt_carries_inputs_and_caps_content() {
        let long = "x".repeat(5_000);
        let req = ScoreRequest {
            keywords: &["rust".into(), "async".into()],
            detail: "tokio internals",
            title: "A title",
            content: &long,
        };
        let p = score_prompt(&req);
        assert!(p.contains("rust, async"));
        assert!(p.contains("tokio internals"));
        assert!(p.len() < 4_000);
    }

    #[test]
    fn rate_limit_is_transient_client_error_is_permanent() {
        assert!(classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(classify_status(reqwest::StatusCode::BAD_GATEWAY).is_transient());
        assert!(!classify_status(reqwest::StatusCode::UNAUTHORIZED).is_transient());
    }
}
