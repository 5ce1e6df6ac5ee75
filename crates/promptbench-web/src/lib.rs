//! HTTP facade over the `promptbench` dispatch engine.
//!
//! `promptbench-web` exposes the engine's three operations as an axum
//! server:
//!
//! | Route | Operation |
//! |-------|-----------|
//! | `GET /api/models` | Allowed free-tier model identifiers |
//! | `POST /api/generate?stream=&max_tokens=` | One completion, JSON or `text/event-stream` |
//! | `POST /api/benchmark` | Multipart prompt file → latency report (JSON or HTML) |
//! | `GET /download/<file>` | Files from the report directory |
//!
//! # Quick start
//!
//! ```ignore
//! use promptbench::prelude::*;
//! use promptbench_web::{WebConfig, spawn_web};
//! use std::sync::Arc;
//!
//! let transport = Arc::new(OpenRouterClient::new(api_key)?);
//! let engine = DispatchEngine::connect(transport).await?;
//!
//! let addr = spawn_web(engine, WebConfig::default()).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! Errors come back as `{"detail": "..."}` with 400 for an unknown model or
//! bad form input, 429 when upstream rate limiting outlasts the retry budget,
//! and 500 for everything upstream-side. A streamed response that fails after
//! its first frame ends with an `event: error` frame instead.

mod api;
pub mod error;
mod server;

pub use api::{AppState, DEFAULT_RUNS};
pub use error::ApiError;
pub use server::{build_router, run_server, start_server};

use std::net::SocketAddr;
use std::path::PathBuf;

use promptbench::engine::DispatchEngine;

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:8000`.
    pub bind_addr: SocketAddr,
    /// Where benchmark CSVs are written and served from. Default: `.`.
    pub report_dir: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            report_dir: PathBuf::from("."),
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
pub async fn spawn_web(engine: DispatchEngine, config: WebConfig) -> std::io::Result<SocketAddr> {
    let router = build_router(engine, config.report_dir);
    start_server(router, config.bind_addr).await
}
