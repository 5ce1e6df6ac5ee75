//! Upstream call layer: buffered completions, streamed relays, and the retry
//! schedule they share.
//!
//! - [`completion`]: [`CompletionClient`] issues one non-streaming call and
//!   retries HTTP 429 with exponential backoff. Nothing else is retried.
//! - [`streaming`]: [`StreamingRelay`] opens a streaming call and re-frames
//!   upstream lines as server-sent events, with an in-band terminal frame.
//! - [`retry`]: [`RetryConfig`] and the [`Backoff`](retry::Backoff) attempt
//!   counter, plus the injectable [`Sleeper`](retry::Sleeper).

pub mod completion;
pub mod retry;
pub mod streaming;

pub use completion::CompletionClient;
pub use retry::RetryConfig;
pub use streaming::{RelayStream, SseFrame, StreamingRelay};
