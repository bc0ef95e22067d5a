// src/llm/fallback.rs
//! Primary/secondary provider mux with bounded retries. Transient failures
//! on the primary are retried with backoff, then the secondary (when
//! configured) gets the same bounded attempts. Permanent failures skip
//! straight to the secondary.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::warn;

use super::{LlmClient, LlmError, ScoreRequest, Scored, SummaryRequest};

/// Boxed provider-call future; what `async_trait` methods return anyway.
type OpFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, LlmError>> + Send + 'a>>;

pub struct FallbackLlm {
    primary: Arc<dyn LlmClient>,
    secondary: Option<Arc<dyn LlmClient>>,
    max_attempts: u32,
    retry_base: Duration,
}

impl FallbackLlm {
    pub fn new(primary: Arc<dyn LlmClient>, secondary: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            primary,
            secondary,
            max_attempts: 2,
            retry_base: Duration::from_millis(400),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_base = retry_base;
        self
    }

    /// Build from whatever providers the environment offers: Gemini first,
    /// Anthropic as the fallback, either alone if only one key is present.
    pub fn from_env() -> Option<Self> {
        use super::providers::{AnthropicClient, GeminiClient};
        let gemini = GeminiClient::from_env(None).map(|c| Arc::new(c) as Arc<dyn LlmClient>);
        let anthropic = AnthropicClient::from_env(None).map(|c| Arc::new(c) as Arc<dyn LlmClient>);
        match (gemini, anthropic) {
            (Some(primary), secondary) => Some(Self::new(primary, secondary)),
            (None, Some(primary)) => Some(Self::new(primary, None)),
            (None, None) => None,
        }
    }

    async fn attempt<'a, T, F>(&'a self, op_name: &'static str, op: F) -> Result<T, LlmError>
    where
        F: Fn(&'a dyn LlmClient) -> OpFut<'a, T>,
    {
        let mut last = match self
            .attempt_provider(self.primary.as_ref(), op_name, &op)
            .await
        {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if let Some(secondary) = &self.secondary {
            counter!("llm_failover_total").increment(1);
            warn!(
                target: "process",
                op = op_name,
                from = self.primary.provider_name(),
                to = secondary.provider_name(),
                error = %last,
                "failing over to secondary llm"
            );
            match self.attempt_provider(secondary.as_ref(), op_name, &op).await {
                Ok(v) => return Ok(v),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    async fn attempt_provider<'a, T, F>(
        &'a self,
        provider: &'a dyn LlmClient,
        op_name: &'static str,
        op: &F,
    ) -> Result<T, LlmError>
    where
        F: Fn(&'a dyn LlmClient) -> OpFut<'a, T>,
    {
        let mut delay = self.retry_base;
        let mut last = LlmError::Permanent("no attempt made".into());
        for attempt in 1..=self.max_attempts {
            match op(provider).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let transient = e.is_transient();
                    warn!(
                        target: "process",
                        provider = provider.provider_name(),
                        op = op_name,
                        attempt,
                        error = %e,
                        "llm call failed"
                    );
                    last = e;
                    if !transient {
                        break;
                    }
                    if attempt < self.max_attempts {
                        counter!("llm_retries_total").increment(1);
                        tokio::time::sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }
        Err(last)
    }
}

#[async_trait::async_trait]
impl LlmClient for FallbackLlm {
    async fn score(&self, req: &ScoreRequest<'_>) -> Result<Scored, LlmError> {
        self.attempt("score", move |c| c.score(req)).await
    }

    async fn summarize(&self, req: &SummaryRequest<'_>) -> Result<String, LlmError> {
        self.attempt("summarize", move |c| c.summarize(req)).await
    }

    fn provider_name(&self) -> &'static str {
        "fallback"
    }
}
