//! Facade server: free-tier OpenRouter completions, SSE streaming, and
//! latency benchmarks over HTTP.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_API_KEY=sk-... cargo run -p promptbench-web
//! OPENROUTER_API_KEY=sk-... cargo run -p promptbench-web -- --bind 0.0.0.0:8080
//! OPENROUTER_API_KEY=sk-... cargo run -p promptbench-web -- --report-dir reports --log-file logs/server.log
//! ```
//!
//! A `.env` file in the working directory is read first. The model catalog is
//! fetched once at startup; if that fails the server exits without binding.
//!
//! ```bash
//! curl localhost:8000/api/models
//! curl -X POST 'localhost:8000/api/generate?stream=true' \
//!   -H 'content-type: application/json' \
//!   -d '{"prompt": "Write a haiku", "model": "google/gemma-3-27b-it:free"}'
//! curl -F prompt_file=@prompts.txt -F model=google/gemma-3-27b-it:free -F runs=3 \
//!   localhost:8000/api/benchmark
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use promptbench::config::{LogArgs, UpstreamArgs};
use promptbench_web::{WebConfig, build_router, run_server};
use tracing::{error, info};

/// HTTP facade over the promptbench dispatch engine.
#[derive(Parser)]
#[command(name = "promptbench-web", version)]
struct Args {
    #[command(flatten)]
    upstream: UpstreamArgs,

    #[command(flatten)]
    log: LogArgs,

    /// Address to listen on.
    #[arg(long, env = "PROMPTBENCH_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Directory benchmark CSVs are written to and downloaded from.
    #[arg(long, env = "PROMPTBENCH_REPORT_DIR", default_value = ".")]
    report_dir: PathBuf,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    args.log.init()?;

    // Refuse to start without an allow-list.
    let engine = args.upstream.connect().await.map_err(|e| {
        error!("Startup aborted: {e}");
        e
    })?;
    info!("{} model(s) available", engine.registry().len());

    std::fs::create_dir_all(&args.report_dir)
        .map_err(|e| format!("failed to create {}: {e}", args.report_dir.display()))?;

    let config = WebConfig {
        bind_addr: args.bind,
        report_dir: args.report_dir,
    };
    let router = build_router(engine, config.report_dir);
    run_server(router, config.bind_addr, shutdown_signal())
        .await
        .map_err(|e| format!("server error: {e}"))
}
