//! REST endpoint handlers.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use futures::StreamExt;
use promptbench::benchmark::{BenchmarkReport, parse_prompts};
use promptbench::engine::DispatchEngine;
use promptbench::report::{self, CSV_FILE_NAME};
use promptbench::{DEFAULT_MAX_TOKENS, GenerationRequest, GenerationResult};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;

/// Default number of calls per prompt when the form omits `runs`.
pub const DEFAULT_RUNS: u32 = 5;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: DispatchEngine,
    pub report_dir: Arc<PathBuf>,
}

/// GET /api/models: allowed model identifiers, sorted.
pub async fn get_models(State(app): State<AppState>) -> Json<Vec<String>> {
    Json(app.engine.list_models())
}

/// Query string for POST /api/generate.
#[derive(Deserialize, Debug, Default)]
pub struct GenerateParams {
    #[serde(default)]
    pub stream: bool,
    pub max_tokens: Option<u32>,
}

/// Request body for POST /api/generate.
#[derive(Deserialize, Debug)]
pub struct GenerateBody {
    pub prompt: String,
    pub model: String,
}

/// POST /api/generate: one completion.
///
/// With `?stream=true` the body is a `text/event-stream` of relay frames;
/// failures before the first frame still come back as JSON errors, and so
/// do malformed query strings and bodies.
pub async fn post_generate(
    State(app): State<AppState>,
    params: Result<Query<GenerateParams>, QueryRejection>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let Json(body) = body?;
    let req = GenerationRequest::new(body.prompt, body.model)
        .with_max_tokens(params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS));

    if params.stream {
        let frames = app.engine.stream(&req).await?;
        let body = Body::from_stream(frames.map(|frame| Ok::<_, Infallible>(frame.encode())));
        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response());
    }

    let result: GenerationResult = app.engine.generate(&req).await?;
    Ok(Json(result).into_response())
}

/// Parsed multipart form for POST /api/benchmark.
#[derive(Debug)]
struct BenchmarkForm {
    prompts: Vec<String>,
    model: String,
    runs: u32,
    visualize: bool,
}

impl BenchmarkForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut prompts = None;
        let mut model = None;
        let mut runs = DEFAULT_RUNS;
        let mut visualize = false;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let read_err = |e: MultipartError| {
                ApiError::BadRequest(format!("failed to read field {name}: {e}"))
            };
            match name.as_str() {
                "prompt_file" => {
                    let bytes = field.bytes().await.map_err(read_err)?;
                    let text = std::str::from_utf8(&bytes).map_err(|_| {
                        ApiError::BadRequest("prompt_file must be UTF-8 text".into())
                    })?;
                    prompts = Some(parse_prompts(text));
                }
                "model" => {
                    model = Some(field.text().await.map_err(read_err)?.trim().to_string());
                }
                "runs" => {
                    let raw = field.text().await.map_err(read_err)?;
                    runs = raw.trim().parse().map_err(|_| {
                        ApiError::BadRequest(format!("runs must be a positive integer, got {raw:?}"))
                    })?;
                }
                "visualize" => {
                    let raw = field.text().await.map_err(read_err)?;
                    visualize = parse_flag(&raw).ok_or_else(|| {
                        ApiError::BadRequest(format!("visualize must be a boolean, got {raw:?}"))
                    })?;
                }
                _ => {}
            }
        }

        Ok(Self {
            prompts: prompts.ok_or_else(|| ApiError::BadRequest("missing prompt_file".into()))?,
            model: model
                .filter(|m| !m.is_empty())
                .ok_or_else(|| ApiError::BadRequest("missing model".into()))?,
            runs,
            visualize,
        })
    }
}

/// Form-style boolean: true/false, 1/0, on/off, yes/no.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// POST /api/benchmark: latency benchmark over an uploaded prompt file.
///
/// Writes `benchmark_results.csv` into the report directory (served under
/// `/download/`), then returns the report as JSON or, with `visualize`, as an
/// HTML page.
pub async fn post_benchmark(
    State(app): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = BenchmarkForm::read(multipart).await?;
    info!(
        "Benchmark requested: {} prompt(s), model={}, runs={}",
        form.prompts.len(),
        form.model,
        form.runs
    );

    let report: BenchmarkReport = app
        .engine
        .run_benchmark(&form.prompts, &form.model, form.runs)
        .await?;

    let csv_path = app.report_dir.join(CSV_FILE_NAME);
    tokio::fs::write(&csv_path, report::to_csv(&report))
        .await
        .map_err(|e| ApiError::Internal(format!("failed to write {}: {e}", csv_path.display())))?;
    info!("Wrote {}", csv_path.display());

    if form.visualize {
        let href = format!("/download/{CSV_FILE_NAME}");
        Ok(Html(report::to_html(&report, Some(&href))).into_response())
    } else {
        Ok(Json(report).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_flags() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" On "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn generate_params_default_to_buffered() {
        let params: GenerateParams = serde_json::from_str("{}").unwrap();
        assert!(!params.stream);
        assert_eq!(params.max_tokens, None);
    }
}
