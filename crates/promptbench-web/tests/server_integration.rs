//! Integration tests for the promptbench-web server.
//!
//! Each test starts a fake OpenRouter upstream and the real facade server on
//! random ports, with the real reqwest transport between them.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use promptbench::DispatchError;
use promptbench::api::RetryConfig;
use promptbench::client::{DEFAULT_COMPLETION_TIMEOUT, OpenRouterClient};
use promptbench::engine::DispatchEngine;
use promptbench_web::{WebConfig, spawn_web};
use serde_json::{Value, json};

const API_KEY: &str = "test-key";
const MODEL: &str = "google/gemma-3-27b-it:free";
const TITLE: &str = "integration-suite";

/// How long the "slow-429" prompt takes to answer each attempt.
const SLOW_REPLY: Duration = Duration::from_millis(400);

// ── Fake upstream ────────────────────────────────────────────────────

#[derive(Default)]
struct Upstream {
    catalog_status: u16,
    completion_calls: AtomicUsize,
    flaky_calls: AtomicUsize,
    slow_calls: AtomicUsize,
    last_title: Mutex<Option<String>>,
}

async fn models(State(up): State<Arc<Upstream>>) -> Response {
    if up.catalog_status != 200 {
        let status = StatusCode::from_u16(up.catalog_status).unwrap();
        return (status, "catalog down").into_response();
    }
    Json(json!({"data": [
        {"id": "openai/gpt-4o"},
        {"id": MODEL},
        {"id": "deepseek/deepseek-r1:free"},
    ]}))
    .into_response()
}

async fn completions(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    up.completion_calls.fetch_add(1, Ordering::SeqCst);

    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
    if auth != Some("Bearer test-key") {
        return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    *up.last_title.lock().unwrap() = headers
        .get("x-title")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let prompt = body["messages"][0]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    match prompt.as_str() {
        "always-429" => return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response(),
        "once-429" if up.flaky_calls.fetch_add(1, Ordering::SeqCst) == 0 => {
            return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
        }
        "boom" => {
            return (StatusCode::BAD_GATEWAY, "upstream exploded").into_response();
        }
        "slow-429" => {
            tokio::time::sleep(SLOW_REPLY).await;
            if up.slow_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
            }
        }
        _ => {}
    }

    if body["stream"] == true && prompt == "stall" {
        let first = futures::stream::iter([Ok::<_, Infallible>("data: a\n")]);
        return (
            [("content-type", "text/event-stream")],
            Body::from_stream(first.chain(futures::stream::pending())),
        )
            .into_response();
    }

    if body["stream"] == true {
        let chunks = vec![
            Ok::<_, Infallible>("data: {\"delta\":\"he\"}\n\n"),
            Ok(": keep-alive\n"),
            Ok("data: [DONE]\n"),
        ];
        return (
            [("content-type", "text/event-stream")],
            Body::from_stream(futures::stream::iter(chunks)),
        )
            .into_response();
    }

    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": format!("echo: {prompt}")}}],
        "usage": {"total_tokens": 5},
    }))
    .into_response()
}

async fn spawn_upstream(catalog_status: u16) -> (Arc<Upstream>, String) {
    let upstream = Arc::new(Upstream {
        catalog_status,
        ..Default::default()
    });
    let router = Router::new()
        .route("/api/v1/models", get(models))
        .route("/api/v1/chat/completions", post(completions))
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (upstream, format!("http://{addr}/api/v1"))
}

async fn connect(base_url: &str, timeout: Duration) -> Result<DispatchEngine, DispatchError> {
    let client = OpenRouterClient::new(API_KEY)
        .unwrap()
        .with_base_url(base_url)
        .with_timeout(timeout)
        .with_headers("https://example.test", TITLE);
    DispatchEngine::connect(Arc::new(client)).await
}

/// Helper: fake upstream + facade server, both on port 0.
struct TestServer {
    base: String,
    upstream: Arc<Upstream>,
    report_dir: tempfile::TempDir,
}

async fn spawn_test_server() -> TestServer {
    spawn_test_server_with_timeout(DEFAULT_COMPLETION_TIMEOUT).await
}

/// Same as [`spawn_test_server`], with a custom per-attempt upstream timeout.
async fn spawn_test_server_with_timeout(timeout: Duration) -> TestServer {
    let (upstream, upstream_url) = spawn_upstream(200).await;
    let engine = connect(&upstream_url, timeout).await.unwrap().with_retry(RetryConfig {
        initial_delay: Duration::from_millis(1),
        ..RetryConfig::with_attempts(3)
    });

    let report_dir = tempfile::tempdir().unwrap();
    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
        report_dir: report_dir.path().to_path_buf(),
    };
    let addr = spawn_web(engine, config).await.unwrap();
    TestServer {
        base: format!("http://{addr}"),
        upstream,
        report_dir,
    }
}

impl TestServer {
    fn completion_calls(&self) -> usize {
        self.upstream.completion_calls.load(Ordering::SeqCst)
    }

    async fn generate(&self, query: &str, prompt: &str, model: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/api/generate{query}", self.base))
            .json(&json!({"prompt": prompt, "model": model}))
            .send()
            .await
            .unwrap()
    }

    async fn benchmark(&self, form: reqwest::multipart::Form) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/api/benchmark", self.base))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

fn prompt_file(text: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(text.as_bytes().to_vec()).file_name("prompts.txt")
}

// ── Startup ──────────────────────────────────────────────────────────

#[tokio::test]
async fn startup_fails_when_catalog_unavailable() {
    let (_upstream, url) = spawn_upstream(503).await;
    let err = connect(&url, DEFAULT_COMPLETION_TIMEOUT).await.err().unwrap();
    assert!(matches!(err, DispatchError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn models_lists_free_tier_sorted() {
    let server = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/api/models", server.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let models: Vec<String> = resp.json().await.unwrap();
    assert_eq!(models, vec!["deepseek/deepseek-r1:free", MODEL]);
}

// ── Generate ─────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_returns_response_tokens_and_latency() {
    let server = spawn_test_server().await;
    let resp = server.generate("", "hello", MODEL).await;
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["response"], "echo: hello");
    assert_eq!(json["tokens_used"], 5);
    assert!(json["latency_seconds"].as_f64().unwrap() >= 0.0);
    assert_eq!(server.upstream.last_title.lock().unwrap().as_deref(), Some(TITLE));
}

#[tokio::test]
async fn generate_gives_each_rate_limited_attempt_its_own_timeout() {
    // Three attempts of 400 ms each outlast a shared 600 ms budget.
    let server = spawn_test_server_with_timeout(Duration::from_millis(600)).await;
    let resp = server.generate("", "slow-429", MODEL).await;
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["response"], "echo: slow-429");
    assert_eq!(server.completion_calls(), 3);
    assert!(json["latency_seconds"].as_f64().unwrap() >= 3.0 * SLOW_REPLY.as_secs_f64());
}

#[tokio::test]
async fn generate_reports_malformed_body_as_detail() {
    let server = spawn_test_server().await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/generate", server.base);

    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let json: Value = resp.json().await.unwrap();
    assert!(json["detail"].is_string());

    let resp = client
        .post(&url)
        .json(&json!({"prompt": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let json: Value = resp.json().await.unwrap();
    assert!(json["detail"].as_str().unwrap().contains("model"));

    let resp = client
        .post(format!("{url}?max_tokens=lots"))
        .json(&json!({"prompt": "hello", "model": MODEL}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let json: Value = resp.json().await.unwrap();
    assert!(json["detail"].is_string());

    assert_eq!(server.completion_calls(), 0);
}

#[tokio::test]
async fn generate_rejects_paid_model_without_upstream_call() {
    let server = spawn_test_server().await;
    let resp = server.generate("", "hello", "openai/gpt-4o").await;
    assert_eq!(resp.status(), 400);

    let json: Value = resp.json().await.unwrap();
    assert!(json["detail"].as_str().unwrap().contains("openai/gpt-4o"));
    assert_eq!(server.completion_calls(), 0);
}

#[tokio::test]
async fn generate_surfaces_exhausted_rate_limit_as_429() {
    let server = spawn_test_server().await;
    let resp = server.generate("", "always-429", MODEL).await;
    assert_eq!(resp.status(), 429);
    assert_eq!(server.completion_calls(), 3);
}

#[tokio::test]
async fn generate_recovers_after_one_rate_limit() {
    let server = spawn_test_server().await;
    let resp = server.generate("", "once-429", MODEL).await;
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["response"], "echo: once-429");
    assert_eq!(server.completion_calls(), 2);
}

#[tokio::test]
async fn generate_maps_upstream_failure_to_500() {
    let server = spawn_test_server().await;
    let resp = server.generate("", "boom", MODEL).await;
    assert_eq!(resp.status(), 500);
    let json: Value = resp.json().await.unwrap();
    assert!(json["detail"].as_str().unwrap().contains("502"));
    assert_eq!(server.completion_calls(), 1);
}

// ── Streaming ────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_relays_lines_as_sse_frames() {
    let server = spawn_test_server().await;
    let resp = server.generate("?stream=true", "hello", MODEL).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let body = resp.text().await.unwrap();
    assert_eq!(
        body,
        "data: data: {\"delta\":\"he\"}\n\n\
         data: : keep-alive\n\n\
         data: data: [DONE]\n\n\
         event: done\n\n"
    );
}

#[tokio::test]
async fn stream_ends_with_error_frame_when_upstream_stalls() {
    let server = spawn_test_server_with_timeout(Duration::from_millis(300)).await;
    let resp = server.generate("?stream=true", "stall", MODEL).await;
    assert_eq!(resp.status(), 200);

    let body = tokio::time::timeout(Duration::from_secs(5), resp.text())
        .await
        .expect("relay should end once upstream goes idle")
        .unwrap();
    assert!(body.starts_with("data: data: a\n\nevent: error\ndata: stream interrupted: "));
    assert!(body.ends_with("\n\n"));
    assert!(!body.contains("event: done"));
}

#[tokio::test]
async fn stream_rate_limit_fails_before_any_frame() {
    let server = spawn_test_server().await;
    let resp = server.generate("?stream=true", "always-429", MODEL).await;
    assert_eq!(resp.status(), 429);
    let json: Value = resp.json().await.unwrap();
    assert!(json["detail"].is_string());
    assert_eq!(server.completion_calls(), 1);
}

#[tokio::test]
async fn stream_rejects_paid_model() {
    let server = spawn_test_server().await;
    let resp = server
        .generate("?stream=true", "hello", "openai/gpt-4o")
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(server.completion_calls(), 0);
}

// ── Benchmark ────────────────────────────────────────────────────────

#[tokio::test]
async fn benchmark_returns_report_and_serves_csv() {
    let server = spawn_test_server().await;
    let form = reqwest::multipart::Form::new()
        .part("prompt_file", prompt_file("hi\n\nbye\n"))
        .text("model", MODEL)
        .text("runs", "2");
    let resp = server.benchmark(form).await;
    assert_eq!(resp.status(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["model"], MODEL);
    assert_eq!(json["runs"], 2);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["prompt"], "hi");
    assert_eq!(results[1]["prompt"], "bye");
    for row in results {
        assert!(row["min"].as_f64().unwrap() <= row["avg"].as_f64().unwrap());
        assert!(row["avg"].as_f64().unwrap() <= row["max"].as_f64().unwrap());
    }
    assert_eq!(server.completion_calls(), 4);

    let on_disk = std::fs::read_to_string(server.report_dir.path().join("benchmark_results.csv"))
        .unwrap();
    let csv = reqwest::get(format!("{}/download/benchmark_results.csv", server.base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(csv, on_disk);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "prompt,avg,min,max,std_dev");
    assert!(lines[1].starts_with("hi,"));
    assert!(lines[2].starts_with("bye,"));
}

#[tokio::test]
async fn benchmark_visualize_returns_html() {
    let server = spawn_test_server().await;
    let form = reqwest::multipart::Form::new()
        .part("prompt_file", prompt_file("<b>bold</b>\n"))
        .text("model", MODEL)
        .text("runs", "1")
        .text("visualize", "true");
    let resp = server.benchmark(form).await;
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );

    let html = resp.text().await.unwrap();
    assert!(html.contains(&format!("Benchmark results for model: {MODEL}")));
    assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
    assert!(html.contains("/download/benchmark_results.csv"));
}

#[tokio::test]
async fn benchmark_aborts_on_first_failure() {
    let server = spawn_test_server().await;
    let form = reqwest::multipart::Form::new()
        .part("prompt_file", prompt_file("ok\nboom\nnever\n"))
        .text("model", MODEL)
        .text("runs", "2");
    let resp = server.benchmark(form).await;
    assert_eq!(resp.status(), 500);
    // Two calls for "ok", one for "boom", none for "never".
    assert_eq!(server.completion_calls(), 3);
    assert!(!server.report_dir.path().join("benchmark_results.csv").exists());
}

#[tokio::test]
async fn benchmark_validates_form() {
    let server = spawn_test_server().await;

    let missing_model =
        reqwest::multipart::Form::new().part("prompt_file", prompt_file("hi\n"));
    assert_eq!(server.benchmark(missing_model).await.status(), 400);

    let zero_runs = reqwest::multipart::Form::new()
        .part("prompt_file", prompt_file("hi\n"))
        .text("model", MODEL)
        .text("runs", "0");
    assert_eq!(server.benchmark(zero_runs).await.status(), 400);

    let bad_runs = reqwest::multipart::Form::new()
        .part("prompt_file", prompt_file("hi\n"))
        .text("model", MODEL)
        .text("runs", "many");
    assert_eq!(server.benchmark(bad_runs).await.status(), 400);

    let paid_model = reqwest::multipart::Form::new()
        .part("prompt_file", prompt_file("hi\n"))
        .text("model", "openai/gpt-4o");
    assert_eq!(server.benchmark(paid_model).await.status(), 400);

    assert_eq!(server.completion_calls(), 0);
}
