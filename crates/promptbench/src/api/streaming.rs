//! Streaming relay: upstream chat-completion lines re-framed as server-sent
//! events.
//!
//! [`StreamingRelay::stream`] validates the model, opens the upstream stream,
//! and fails with a [`DispatchError`] only while nothing has been committed
//! to the caller (bad model, 429, other non-success status). Once the status
//! is known to be 2xx, a producer task reads the body line by line and pushes
//! [`SseFrame`]s into a bounded channel. Every later failure becomes a
//! terminal [`SseFrame::Error`]; a clean end of body becomes
//! [`SseFrame::Done`].
//!
//! Dropping the returned [`RelayStream`] closes the channel. The producer
//! notices on its next select and drops the upstream body, which releases the
//! connection.

use crate::registry::ModelRegistry;
use crate::transport::{ByteStream, Transport, UpstreamReply};
use crate::{ChatRequest, DispatchError, GenerationRequest};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Frames buffered ahead of a slow consumer before the producer waits.
pub const CHANNEL_CAPACITY: usize = 32;

/// One outbound server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// One non-blank upstream line.
    Data(String),
    /// Upstream finished cleanly.
    Done,
    /// Upstream failed after the stream was committed.
    Error(String),
}

impl SseFrame {
    /// Wire encoding, including the blank-line separator.
    pub fn encode(&self) -> String {
        match self {
            SseFrame::Data(line) => format!("data: {line}\n\n"),
            SseFrame::Done => "event: done\n\n".to_string(),
            SseFrame::Error(message) => {
                let mut out = String::from("event: error\n");
                for line in message.lines() {
                    out.push_str("data: ");
                    out.push_str(line);
                    out.push('\n');
                }
                if message.is_empty() {
                    out.push_str("data: \n");
                }
                out.push('\n');
                out
            }
        }
    }

    /// `Done` or `Error`: nothing follows this frame.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SseFrame::Data(_))
    }
}

/// Splits a byte stream into complete `\n`-terminated lines.
///
/// Bytes are held until a newline arrives, so multi-byte characters split
/// across chunks decode correctly. A complete line that is not valid UTF-8
/// is an error.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append `chunk` and drain every complete line, trimmed, blanks skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = decode_line(raw)? {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Result<Option<String>, String> {
        decode_line(std::mem::take(&mut self.pending))
    }
}

fn decode_line(raw: Vec<u8>) -> Result<Option<String>, String> {
    let text =
        String::from_utf8(raw).map_err(|e| format!("invalid UTF-8 in upstream line: {e}"))?;
    let line = text.trim();
    if line.is_empty() {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}

/// Opens upstream streams and relays them as [`SseFrame`]s.
#[derive(Clone)]
pub struct StreamingRelay {
    transport: Arc<dyn Transport>,
    registry: Arc<ModelRegistry>,
}

impl StreamingRelay {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<ModelRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Start relaying `req`.
    ///
    /// Must be called inside a tokio runtime; the producer runs as a spawned
    /// task.
    pub async fn stream(&self, req: &GenerationRequest) -> Result<RelayStream, DispatchError> {
        self.registry.check(&req.model)?;

        let body = ChatRequest::for_generation(req).streaming();
        debug!("Opening upstream stream: model={}", body.model);

        let upstream = match self
            .transport
            .open_stream(&body)
            .await
            .map_err(DispatchError::Transport)?
        {
            UpstreamReply::Success(upstream) => upstream,
            UpstreamReply::RateLimited => {
                warn!("Upstream stream rejected with HTTP 429");
                return Err(DispatchError::RateLimited { attempts: 1 });
            }
            UpstreamReply::Failed { status, body } => {
                return Err(DispatchError::UpstreamError { status, body });
            }
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump(upstream, tx));
        Ok(RelayStream { rx })
    }
}

/// Producer loop: upstream bytes in, frames out, exactly one terminal frame.
async fn pump(mut upstream: ByteStream, tx: mpsc::Sender<SseFrame>) {
    let mut buffer = LineBuffer::default();
    let mut forwarded = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("Stream consumer went away after {forwarded} frame(s); dropping upstream");
                return;
            }
            next = upstream.next() => next,
        };

        let lines = match next {
            Some(Ok(chunk)) => buffer.push(&chunk),
            Some(Err(e)) => Err(e),
            None => {
                let tail = buffer.finish();
                let terminal = match tail {
                    Ok(Some(line)) => {
                        if tx.send(SseFrame::Data(line)).await.is_err() {
                            return;
                        }
                        forwarded += 1;
                        SseFrame::Done
                    }
                    Ok(None) => SseFrame::Done,
                    Err(e) => interrupted(e),
                };
                debug!("Upstream stream ended after {forwarded} frame(s)");
                let _ = tx.send(terminal).await;
                return;
            }
        };

        match lines {
            Ok(lines) => {
                for line in lines {
                    trace!("SSE line: {line}");
                    if tx.send(SseFrame::Data(line)).await.is_err() {
                        return;
                    }
                    forwarded += 1;
                }
            }
            Err(e) => {
                let _ = tx.send(interrupted(e)).await;
                return;
            }
        }
    }
}

fn interrupted(reason: String) -> SseFrame {
    let err = DispatchError::StreamInterrupted(reason);
    warn!("{err}");
    SseFrame::Error(err.to_string())
}

/// Consumer end of a relay. Yields data frames, then one terminal frame.
#[derive(Debug)]
pub struct RelayStream {
    rx: mpsc::Receiver<SseFrame>,
}

impl RelayStream {
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        self.rx.recv().await
    }

    /// Drain the whole stream.
    pub async fn collect_frames(mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.rx.recv().await {
            frames.push(frame);
        }
        frames
    }
}

impl Stream for RelayStream {
    type Item = SseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SseFrame>> {
        self.rx.poll_recv(cx)
    }
}
