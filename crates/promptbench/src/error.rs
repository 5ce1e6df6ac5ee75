//! Error taxonomy for the dispatch engine.
//!
//! Every operation that talks to the upstream provider returns a
//! [`DispatchError`]. Variants are split by who can act on them: the caller
//! (`InvalidModel`, `InvalidRequest`), time (`RateLimited`), or nobody but the
//! upstream (`UpstreamError`, `MalformedResponse`, `UpstreamUnavailable`,
//! `Transport`). `StreamInterrupted` never reaches an error channel; the relay
//! renders it into a terminal `event: error` frame instead.

use thiserror::Error;

/// Failure of a dispatch operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The requested model is not in the registry's allow-list.
    #[error("model {0} is not available; only free-tier models may be used")]
    InvalidModel(String),

    /// The facade input was unusable (e.g. zero benchmark runs).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream kept answering HTTP 429 until the retry budget ran out.
    #[error("rate limited by upstream after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    /// Upstream answered with a definitive non-success status.
    #[error("upstream HTTP {status}: {body}")]
    UpstreamError { status: u16, body: String },

    /// The model catalog could not be loaded; fatal at startup.
    #[error("model catalog unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Upstream returned success but the payload broke the expected schema.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// A streaming response failed after frames were already committed.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// No HTTP status was received (connect failure, timeout, body read).
    #[error("request failed: {0}")]
    Transport(String),
}

impl DispatchError {
    /// Whether the caller can fix the failure by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::InvalidModel(_) | DispatchError::InvalidRequest(_)
        )
    }
}
