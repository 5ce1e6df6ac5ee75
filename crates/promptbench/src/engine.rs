//! [`DispatchEngine`]: the facade's three operations behind one handle.

use crate::api::retry::Sleeper;
use crate::api::{CompletionClient, RelayStream, RetryConfig, StreamingRelay};
use crate::benchmark::{BenchmarkReport, BenchmarkRunner};
use crate::registry::ModelRegistry;
use crate::transport::Transport;
use crate::{DEFAULT_MAX_TOKENS, DispatchError, GenerationRequest, GenerationResult};
use std::sync::Arc;

/// Shared registry plus the completion, streaming, and benchmark paths.
///
/// Cheap to clone; clones share the transport and the allow-list.
#[derive(Clone)]
pub struct DispatchEngine {
    registry: Arc<ModelRegistry>,
    completion: CompletionClient,
    relay: StreamingRelay,
    benchmark_max_tokens: u32,
}

impl DispatchEngine {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            completion: CompletionClient::new(transport.clone(), registry.clone()),
            relay: StreamingRelay::new(transport, registry.clone()),
            registry,
            benchmark_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Load the allow-list through `transport`, then build the engine.
    pub async fn connect(transport: Arc<dyn Transport>) -> Result<Self, DispatchError> {
        let registry = ModelRegistry::load(transport.as_ref()).await?;
        Ok(Self::new(transport, Arc::new(registry)))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.completion = self.completion.with_retry(retry);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.completion = self.completion.with_sleeper(sleeper);
        self
    }

    pub fn with_benchmark_max_tokens(mut self, max_tokens: u32) -> Self {
        self.benchmark_max_tokens = max_tokens;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Allowed model identifiers, sorted.
    pub fn list_models(&self) -> Vec<String> {
        self.registry.models().map(String::from).collect()
    }

    /// One buffered completion.
    pub async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResult, DispatchError> {
        self.completion.complete(req).await
    }

    /// One streamed completion.
    pub async fn stream(&self, req: &GenerationRequest) -> Result<RelayStream, DispatchError> {
        self.relay.stream(req).await
    }

    /// Sequential latency benchmark; see [`BenchmarkRunner::run`].
    pub async fn run_benchmark<S: AsRef<str>>(
        &self,
        prompts: &[S],
        model: &str,
        runs: u32,
    ) -> Result<BenchmarkReport, DispatchError> {
        BenchmarkRunner::new(self.completion.clone())
            .with_max_tokens(self.benchmark_max_tokens)
            .run(prompts, model, runs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SseFrame;
    use crate::api::retry::testing::RecordingSleeper;
    use crate::transport::UpstreamReply;
    use crate::transport::testing::{ScriptedTransport, byte_stream, completion_body};

    fn catalog() -> String {
        serde_json::json!({"data": [
            {"id": "z/last:free"},
            {"id": "paid/model"},
            {"id": "a/first:free"},
        ]})
        .to_string()
    }

    async fn engine(transport: Arc<ScriptedTransport>) -> DispatchEngine {
        transport.push_models(Ok(UpstreamReply::Success(catalog())));
        DispatchEngine::connect(transport)
            .await
            .unwrap()
            .with_sleeper(Arc::new(RecordingSleeper::default()))
    }

    #[tokio::test]
    async fn connect_loads_sorted_free_models() {
        let engine = engine(Arc::new(ScriptedTransport::new())).await;
        assert_eq!(engine.list_models(), vec!["a/first:free", "z/last:free"]);
    }

    #[tokio::test]
    async fn connect_fails_when_catalog_unavailable() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_models(Ok(UpstreamReply::Failed {
            status: 500,
            body: String::new(),
        }));
        let err = DispatchEngine::connect(transport).await.err().unwrap();
        assert!(matches!(err, DispatchError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn operations_share_one_allow_list() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = engine(transport.clone()).await;

        transport.push_completion(Ok(UpstreamReply::Success(completion_body("hey", Some(7)))));
        let result = engine
            .generate(&GenerationRequest::new("hi", "a/first:free"))
            .await
            .unwrap();
        assert_eq!(result.text, "hey");

        transport.push_stream(Ok(UpstreamReply::Success(byte_stream(vec![Ok(
            b"chunk\n".to_vec(),
        )]))));
        let frames = engine
            .stream(&GenerationRequest::new("hi", "z/last:free"))
            .await
            .unwrap()
            .collect_frames()
            .await;
        assert_eq!(frames, vec![SseFrame::Data("chunk".into()), SseFrame::Done]);

        let err = engine
            .run_benchmark(&["p"], "paid/model", 1)
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn benchmark_uses_configured_max_tokens() {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = engine(transport.clone()).await.with_benchmark_max_tokens(16);
        transport.push_completion(Ok(UpstreamReply::Success(completion_body("ok", None))));

        let report = engine.run_benchmark(&["p"], "a/first:free", 1).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(transport.requests()[0].max_tokens, 16);
    }
}
