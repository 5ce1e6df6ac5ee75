//! Convenience re-exports for common `promptbench` types.
//!
//! ```ignore
//! use promptbench::prelude::*;
//! ```
//!
//! Covers building an engine and calling its operations. Retry internals,
//! line buffering, and report rendering are imported from their modules.

pub use crate::{DispatchError, GenerationRequest, GenerationResult};

pub use crate::api::{CompletionClient, RelayStream, RetryConfig, SseFrame, StreamingRelay};
pub use crate::benchmark::{BenchmarkReport, BenchmarkRunner, PromptStats};
pub use crate::client::OpenRouterClient;
pub use crate::engine::DispatchEngine;
pub use crate::registry::ModelRegistry;
pub use crate::transport::{Transport, UpstreamReply};
