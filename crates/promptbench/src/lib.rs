//! Dispatch engine for a prompt-generation facade over the
//! [OpenRouter](https://openrouter.ai/) chat completions API.
//!
//! `promptbench` sends single-message completions upstream, retries
//! rate-limited calls with exponential backoff, relays streamed responses as
//! server-sent-event frames, and measures per-prompt latency over repeated
//! trials. Everything that talks to the network goes through the
//! [`Transport`](transport::Transport) seam, so the engine can be driven by
//! the reqwest-backed [`OpenRouterClient`](client::OpenRouterClient) in
//! production and by scripted transports in tests.
//!
//! # Getting started
//!
//! ```ignore
//! use promptbench::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DispatchError> {
//!     let api_key = std::env::var("OPENROUTER_API_KEY").unwrap();
//!     let transport: Arc<dyn Transport> =
//!         Arc::new(OpenRouterClient::new(api_key).map_err(DispatchError::Transport)?);
//!
//!     // Fetch the free-tier allow-list once; abort if it cannot be loaded.
//!     let registry = Arc::new(ModelRegistry::load(transport.as_ref()).await?);
//!     let engine = DispatchEngine::new(transport, registry);
//!
//!     let req = GenerationRequest::new("Say hi", "meta-llama/llama-3.3-8b-instruct:free");
//!     let result = engine.generate(&req).await?;
//!     println!("{} ({:.3}s)", result.text, result.latency_seconds);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | [`ModelRegistry`](registry::ModelRegistry): free-tier allow-list loaded at startup |
//! | [`api`] | Completion client with 429 backoff, SSE streaming relay, retry state machine |
//! | [`benchmark`] | Sequential latency trials and per-prompt statistics |
//! | [`report`] | CSV and HTML rendering of benchmark reports |
//! | [`transport`] | The [`Transport`](transport::Transport) trait and tagged upstream replies |
//! | [`client`] | reqwest implementation of the transport |
//! | [`engine`] | [`DispatchEngine`](engine::DispatchEngine) bundling the facade operations |
//! | [`config`] | clap argument groups for upstream settings and logging |

pub mod api;
pub mod benchmark;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod registry;
pub mod report;
pub mod transport;

pub use error::DispatchError;

use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// Base URL of the OpenRouter v1 API.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Suffix that marks a model identifier as free-tier.
pub const FREE_TIER_SUFFIX: &str = ":free";

/// Default completion budget for a generation request.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

// ── Facade types ───────────────────────────────────────────────────

/// A prompt to send to one model.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Outcome of one successful non-streaming completion.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GenerationResult {
    /// Content of the first choice.
    #[serde(rename = "response")]
    pub text: String,
    /// `usage.total_tokens`, when upstream reports it.
    pub tokens_used: Option<u32>,
    /// Wall-clock seconds from the first attempt to the full response.
    pub latency_seconds: f64,
}

// ── Wire types ─────────────────────────────────────────────────────

/// Chat completion request body sent upstream.
#[derive(Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Single user-message payload for a generation request.
    pub fn for_generation(req: &GenerationRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: vec![Message::user(&req.prompt)],
            max_tokens: req.max_tokens,
            stream: None,
        }
    }

    /// Same payload with `stream: true`.
    pub fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}

/// Role of a message in the conversation. Requests carry a single user turn.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
pub(crate) struct RawChatResponse {
    pub(crate) choices: Option<Vec<RawChoice>>,
    pub(crate) error: Option<ApiErrorResponse>,
    #[serde(default)]
    pub(crate) usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawChoice {
    pub(crate) message: Option<RawResponseMessage>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawResponseMessage {
    pub(crate) content: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorResponse {
    pub(crate) message: String,
    pub(crate) code: Option<u16>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// `GET /models` response.
#[derive(Deserialize, Debug)]
pub(crate) struct ModelsResponse {
    pub(crate) data: Vec<ModelEntry>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ModelEntry {
    pub(crate) id: String,
}
