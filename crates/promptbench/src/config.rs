//! Command-line and environment settings shared by the binaries.
//!
//! Both `promptbench` and `promptbench-web` flatten [`UpstreamArgs`] and
//! [`LogArgs`] into their own clap parsers, so the same flags and
//! environment variables work for either.

use crate::api::RetryConfig;
use crate::client::{DEFAULT_REFERER, DEFAULT_TITLE, OpenRouterClient};
use crate::engine::DispatchEngine;
use crate::{DEFAULT_MAX_TOKENS, OPENROUTER_BASE_URL};
use clap::Args;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable accepted as a fallback for the API key.
pub const LEGACY_KEY_VAR: &str = "OPENROUTER_KEY";

/// Upstream connection and retry settings.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// OpenRouter API key (falls back to OPENROUTER_KEY)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API root for the models and chat completions endpoints
    #[arg(long, env = "PROMPTBENCH_BASE_URL", default_value = OPENROUTER_BASE_URL)]
    pub base_url: String,

    /// Per-attempt completion timeout in seconds
    #[arg(long, env = "PROMPTBENCH_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Attempts per completion while upstream answers HTTP 429
    #[arg(long, env = "PROMPTBENCH_RETRY_ATTEMPTS", default_value_t = 5)]
    pub retry_attempts: u32,

    /// Backoff before the second attempt, in milliseconds; doubles afterwards
    #[arg(long, env = "PROMPTBENCH_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// HTTP-Referer header sent upstream for attribution
    #[arg(long, env = "PROMPTBENCH_REFERER", default_value = DEFAULT_REFERER)]
    pub referer: String,

    /// X-Title header sent upstream for attribution
    #[arg(long, env = "PROMPTBENCH_APP_TITLE", default_value = DEFAULT_TITLE)]
    pub app_title: String,

    /// max_tokens sent with every benchmark trial
    #[arg(long, env = "PROMPTBENCH_BENCH_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub bench_max_tokens: u32,
}

impl UpstreamArgs {
    /// The configured API key, or the legacy variable, if non-empty.
    pub fn resolve_api_key(&self) -> Result<String, String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(LEGACY_KEY_VAR).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| "Set OPENROUTER_API_KEY to your OpenRouter API key".to_string())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            ..RetryConfig::with_attempts(self.retry_attempts)
        }
    }

    pub fn client(&self) -> Result<OpenRouterClient, String> {
        Ok(OpenRouterClient::new(self.resolve_api_key()?)?
            .with_base_url(&self.base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_headers(&self.referer, &self.app_title))
    }

    /// Build the client, load the allow-list, and assemble the engine.
    ///
    /// Fails if the model catalog cannot be loaded.
    pub async fn connect(&self) -> Result<DispatchEngine, String> {
        let transport = Arc::new(self.client()?);
        let engine = DispatchEngine::connect(transport)
            .await
            .map_err(|e| e.to_string())?;
        Ok(engine
            .with_retry(self.retry_config())
            .with_benchmark_max_tokens(self.bench_max_tokens))
    }
}

/// Log filter and optional log file.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// tracing filter directive, e.g. `info` or `promptbench=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    /// Also append logs (without colors) to this file
    #[arg(long, env = "PROMPTBENCH_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl LogArgs {
    /// Install the global subscriber: stderr always, plus the log file if set.
    pub fn init(&self) -> Result<(), String> {
        let filter = EnvFilter::try_new(&self.log_filter)
            .map_err(|e| format!("invalid log filter '{}': {e}", self.log_filter))?;

        let file_layer = match &self.log_file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| format!("failed to open log file {}: {e}", path.display()))?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(file_layer)
            .try_init()
            .map_err(|e| format!("failed to install tracing subscriber: {e}"))
    }
}
