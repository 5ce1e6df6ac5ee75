//! reqwest-backed [`Transport`] for the OpenRouter API.

use crate::transport::{ByteStream, Transport, TransportFuture, UpstreamReply};
use crate::{ChatRequest, OPENROUTER_BASE_URL};
use std::time::Duration;
use tracing::debug;

/// Timeout for the model catalog request.
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for one completion attempt.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default `HTTP-Referer` attribution header.
pub const DEFAULT_REFERER: &str = "https://github.com/tacryt-socryp/promptbench";

/// Default `X-Title` attribution header.
pub const DEFAULT_TITLE: &str = "promptbench";

/// Async HTTP client for the OpenRouter models and chat completions endpoints.
///
/// Timeouts are applied per request, so every retry attempt gets a fresh
/// window. A streaming request must produce its headers, and then each body
/// chunk, within the same timeout; a stalled body ends the stream with an
/// error.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    referer: String,
    title: String,
    timeout: Duration,
}

impl OpenRouterClient {
    /// Create a client with the default base URL, headers, and timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("promptbench/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CATALOG_TIMEOUT)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: OPENROUTER_BASE_URL.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
            timeout: DEFAULT_COMPLETION_TIMEOUT,
        })
    }

    /// Point the client at a different API root (no trailing slash needed).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-attempt timeout for completion requests, and the idle limit
    /// between streamed chunks.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Custom `HTTP-Referer` and `X-Title` attribution headers.
    pub fn with_headers(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
    }

    async fn read_reply(resp: reqwest::Response) -> Result<UpstreamReply<String>, String> {
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {e}"))?;
        Ok(UpstreamReply::from_parts(status, text))
    }
}

impl Transport for OpenRouterClient {
    fn fetch_models(&self) -> TransportFuture<'_, String> {
        Box::pin(async move {
            let url = format!("{}/models", self.base_url);
            debug!("GET {url}");
            let resp = self
                .authorized(self.client.get(&url))
                .timeout(CATALOG_TIMEOUT)
                .send()
                .await
                .map_err(|e| format!("catalog request failed: {e}"))?;
            Self::read_reply(resp).await
        })
    }

    fn post_completion<'a>(&'a self, body: &'a ChatRequest) -> TransportFuture<'a, String> {
        Box::pin(async move {
            let resp = self
                .authorized(self.client.post(self.completions_url()))
                .timeout(self.timeout)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        format!("request timed out after {:?}", self.timeout)
                    } else {
                        format!("request failed: {e}")
                    }
                })?;
            Self::read_reply(resp).await
        })
    }

    fn open_stream<'a>(&'a self, body: &'a ChatRequest) -> TransportFuture<'a, ByteStream> {
        Box::pin(async move {
            let send = self
                .authorized(self.client.post(self.completions_url()))
                .json(body)
                .send();
            let resp = tokio::time::timeout(self.timeout, send)
                .await
                .map_err(|_| format!("no response headers after {:?}", self.timeout))?
                .map_err(|e| format!("streaming request failed: {e}"))?;

            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Ok(UpstreamReply::RateLimited);
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Ok(UpstreamReply::Failed {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(UpstreamReply::Success(body_stream(resp, self.timeout)))
        })
    }
}

/// Adapt a response body into a [`ByteStream`]; ends after the first error.
///
/// Waiting longer than `idle` for the next chunk is an error.
fn body_stream(resp: reqwest::Response, idle: Duration) -> ByteStream {
    Box::pin(futures::stream::unfold(Some(resp), move |state| async move {
        let mut resp = state?;
        match tokio::time::timeout(idle, resp.chunk()).await {
            Ok(Ok(Some(bytes))) => Some((Ok(bytes.to_vec()), Some(resp))),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => Some((Err(format!("failed to read streaming chunk: {e}")), None)),
            Err(_) => Some((Err(format!("no data from upstream for {idle:?}")), None)),
        }
    }))
}
