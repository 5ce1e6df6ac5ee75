//! The network seam between the dispatch engine and the upstream provider.
//!
//! The engine never branches on raw HTTP responses or transport exceptions.
//! A [`Transport`] classifies every reply into an [`UpstreamReply`] that the
//! dispatch logic matches exhaustively: success, rate-limited, or a
//! definitive failure status. Connection-level failures (no status at all)
//! come back as `Err(String)`.

use crate::ChatRequest;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Transport`] methods.
///
/// Type alias to keep the trait dyn-compatible and its signatures readable.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<UpstreamReply<T>, String>> + Send + 'a>>;

/// Incremental response body: raw byte chunks as they come off the wire.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>;

/// Classified upstream reply.
pub enum UpstreamReply<T> {
    /// 2xx; carries the body (or the open body stream).
    Success(T),
    /// HTTP 429.
    RateLimited,
    /// Any other non-success status.
    Failed { status: u16, body: String },
}

impl UpstreamReply<String> {
    /// Classify a fully-read response by its status code.
    pub fn from_parts(status: u16, body: String) -> Self {
        match status {
            200..=299 => UpstreamReply::Success(body),
            429 => UpstreamReply::RateLimited,
            _ => UpstreamReply::Failed { status, body },
        }
    }
}

impl<T> std::fmt::Debug for UpstreamReply<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamReply::Success(_) => write!(f, "Success(..)"),
            UpstreamReply::RateLimited => write!(f, "RateLimited"),
            UpstreamReply::Failed { status, body } => {
                write!(f, "Failed {{ status: {status}, body: {body:?} }}")
            }
        }
    }
}

/// Access to the upstream completion provider.
///
/// Implementations own connection setup, authentication and timeouts. Each
/// call is independent; nothing is shared between concurrent calls.
pub trait Transport: Send + Sync {
    /// `GET /models`; the success value is the raw JSON body.
    fn fetch_models(&self) -> TransportFuture<'_, String>;

    /// Buffered `POST /chat/completions`; the success value is the raw JSON body.
    fn post_completion<'a>(&'a self, body: &'a ChatRequest) -> TransportFuture<'a, String>;

    /// Streaming `POST /chat/completions`. Resolves once the status line is
    /// known; the success value yields the body incrementally. Dropping the
    /// stream must release the underlying connection.
    fn open_stream<'a>(&'a self, body: &'a ChatRequest) -> TransportFuture<'a, ByteStream>;
}
