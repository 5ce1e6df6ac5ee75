//! Buffered (non-streaming) completion calls with 429 backoff.

use crate::api::retry::{RetryConfig, Sleeper, TokioSleeper};
use crate::registry::ModelRegistry;
use crate::transport::{Transport, UpstreamReply};
use crate::{ChatRequest, DispatchError, GenerationRequest, GenerationResult, RawChatResponse};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Issues one completion per call, retrying only on HTTP 429.
#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn Transport>,
    registry: Arc<ModelRegistry>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl CompletionClient {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            transport,
            registry,
            retry: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the sleeper used between rate-limited attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send `req` upstream and return the first choice's text.
    ///
    /// Rejects models outside the allow-list before any network call. A 429
    /// sleeps `initial_delay * multiplier^n` and tries again until
    /// `max_attempts` rate-limited replies have been seen, then fails with
    /// [`DispatchError::RateLimited`]. Latency covers every attempt and
    /// backoff sleep.
    pub async fn complete(&self, req: &GenerationRequest) -> Result<GenerationResult, DispatchError> {
        self.registry.check(&req.model)?;

        let body = ChatRequest::for_generation(req);
        debug!(
            "LLM request: model={}, max_tokens={}, prompt={} chars",
            body.model,
            body.max_tokens,
            req.prompt.len()
        );

        let start = Instant::now();
        let mut backoff = self.retry.backoff();

        let text = loop {
            let reply = self
                .transport
                .post_completion(&body)
                .await
                .map_err(DispatchError::Transport)?;

            match reply {
                UpstreamReply::Success(text) => break text,
                UpstreamReply::RateLimited => {
                    let delay = backoff.rate_limited();
                    warn!(
                        "HTTP 429 from upstream (attempt {}/{}), retrying in {delay:?}",
                        backoff.attempts(),
                        self.retry.max_attempts,
                    );
                    self.sleeper.sleep(delay).await;
                    if backoff.exhausted() {
                        return Err(DispatchError::RateLimited {
                            attempts: backoff.attempts(),
                        });
                    }
                }
                UpstreamReply::Failed { status, body } => {
                    return Err(DispatchError::UpstreamError { status, body });
                }
            }
        };

        let elapsed = start.elapsed();
        debug!(
            "LLM response in {:.3}s ({} bytes, {} attempt(s))",
            elapsed.as_secs_f64(),
            text.len(),
            backoff.attempts() + 1
        );
        trace!("Response body: {text}");

        let (content, tokens_used) = parse_completion(&text)?;
        Ok(GenerationResult {
            text: content,
            tokens_used,
            latency_seconds: elapsed.as_secs_f64(),
        })
    }
}

/// Extract the first choice's content and total token count.
fn parse_completion(text: &str) -> Result<(String, Option<u32>), DispatchError> {
    let parsed: RawChatResponse = serde_json::from_str(text)
        .map_err(|e| DispatchError::MalformedResponse(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(DispatchError::UpstreamError {
            status: err.code.unwrap_or(200),
            body: err.message,
        });
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let content = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| {
            DispatchError::MalformedResponse("no message content in first choice".into())
        })?;

    Ok((content, parsed.usage.and_then(|u| u.total_tokens)))
}
