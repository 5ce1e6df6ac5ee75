//! Axum server setup and router construction.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use promptbench::engine::DispatchEngine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves:
/// - REST API at `/api/*`
/// - Report files from `report_dir` at `/download/*`
pub fn build_router(engine: DispatchEngine, report_dir: PathBuf) -> Router {
    let app_state = AppState {
        engine,
        report_dir: Arc::new(report_dir.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/models", get(api::get_models))
        .route("/api/generate", post(api::post_generate))
        .route("/api/benchmark", post(api::post_benchmark))
        .nest_service("/download", ServeDir::new(report_dir))
        .with_state(app_state)
        .layer(cors)
}

/// Bind `bind_addr`, serve `router` on a Tokio task, and return the bound
/// address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("Server stopped: {e}");
        }
    });

    info!("Listening on http://{addr}");
    Ok(addr)
}

/// Bind and serve in the current task until `shutdown` resolves.
pub async fn run_server(
    router: Router,
    bind_addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
