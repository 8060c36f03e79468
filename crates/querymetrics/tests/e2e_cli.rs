use std::path::Path;
use std::process::{Command, Output};

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use serde_json::{Value, json};
use testkit::{CaptureServer, sample_table};

const QUERIES: &str = r#"
[[queries]]
MetricName = "azure.requests"
Query = "requests"

[[queries]]
MetricName = "azure.broken"
Query = "broken"

[[queries]]
MetricName = "azure.latency"
MetricType = "counter"
Query = "latency"
"#;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_querymetrics")
}

/// Log Analytics stand-in: the query `broken` is rejected, anything else
/// answers with the sample table.
async fn spawn_log_analytics() -> String {
    async fn query(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        match body["query"].as_str() {
            Some("broken") => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {"code": "BadArgumentError", "message": "Syntax error"}})),
            ),
            _ => (StatusCode::OK, Json(json!({"tables": [sample_table()]}))),
        }
    }

    let app = Router::new().route("/v1/workspaces/{workspace}/query", post(query));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn write_queries(dir: &Path) -> String {
    let path = dir.join("queries.toml");
    std::fs::write(&path, QUERIES).unwrap();
    path.display().to_string()
}

fn querymetrics(dir: &Path, envs: &[(&str, &str)], args: &[&str]) -> Output {
    Command::new(bin())
        .env_clear()
        .env("XDG_CONFIG_HOME", dir)
        .env("RUST_LOG", "info")
        .envs(envs.iter().copied())
        .args(args)
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_sends_every_healthy_descriptor_to_signalfx() {
    let temp = tempfile::tempdir().unwrap();
    let azure = spawn_log_analytics().await;
    let ingest = CaptureServer::spawn().await;
    let queries = write_queries(temp.path());

    let output = querymetrics(
        temp.path(),
        &[
            ("LOG_ANALYTICS_WORKSPACE_GUID", "ws-1"),
            ("LOG_ANALYTICS_ENDPOINT", azure.as_str()),
            ("AZURE_ACCESS_TOKEN", "token"),
            ("SFX_TOKEN", "sfx-token"),
            ("SFX_INGEST_ENDPOINT", ingest.url().as_str()),
            ("METRICS_EXTRA_DIMENSIONS", "env=test"),
        ],
        &["--json", "run", "--queries", queries.as_str()],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary = stdout_json(&output);
    let outcomes = summary["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0]["state"], "sent");
    assert_eq!(outcomes[0]["points_sent"], 3);
    assert_eq!(outcomes[1]["state"], "failed");
    assert_eq!(outcomes[1]["failure"]["kind"], "backend");
    assert!(
        outcomes[1]["failure"]["context"]
            .as_str()
            .unwrap()
            .contains("Syntax error")
    );
    assert_eq!(outcomes[2]["state"], "sent");
    assert_eq!(summary["sender"], "signalfx");

    let requests = ingest.requests();
    assert_eq!(requests.len(), 2);
    let first = requests[0].json();
    let gauge = first["gauge"].as_array().unwrap();
    assert_eq!(gauge[0]["metric"], "azure.requests");
    assert_eq!(gauge[0]["dimensions"]["env"], "test");
    assert!(requests[1].json().get("counter").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_prefers_datadog_when_both_sinks_are_configured() {
    let temp = tempfile::tempdir().unwrap();
    let azure = spawn_log_analytics().await;
    let datadog = CaptureServer::spawn().await;
    let signalfx = CaptureServer::spawn().await;
    let queries = write_queries(temp.path());

    let output = querymetrics(
        temp.path(),
        &[
            ("LOG_ANALYTICS_WORKSPACE_GUID", "ws-1"),
            ("LOG_ANALYTICS_ENDPOINT", azure.as_str()),
            ("AZURE_ACCESS_TOKEN", "token"),
            ("DD_API_KEY", "dd-key"),
            ("DD_API_HOST", datadog.url().as_str()),
            ("SFX_TOKEN", "sfx-token"),
            ("SFX_INGEST_ENDPOINT", signalfx.url().as_str()),
        ],
        &["run", "--queries", queries.as_str()],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 sent, 1 failed"), "stdout: {stdout}");

    assert_eq!(datadog.requests().len(), 2);
    assert!(signalfx.requests().is_empty());
    assert_eq!(datadog.requests()[0].path, "/api/v1/series");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_without_metrics_backend_is_a_configuration_error() {
    let temp = tempfile::tempdir().unwrap();
    let azure = spawn_log_analytics().await;
    let queries = write_queries(temp.path());

    let output = querymetrics(
        temp.path(),
        &[
            ("LOG_ANALYTICS_WORKSPACE_GUID", "ws-1"),
            ("LOG_ANALYTICS_ENDPOINT", azure.as_str()),
            ("AZURE_ACCESS_TOKEN", "token"),
        ],
        &["run", "--queries", queries.as_str()],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no metrics backend"), "stderr: {stderr}");
}

#[test]
fn check_reports_selected_sender_and_backends() {
    let temp = tempfile::tempdir().unwrap();
    let queries = write_queries(temp.path());

    let output = querymetrics(
        temp.path(),
        &[
            ("LOG_ANALYTICS_WORKSPACE_GUID", "ws-1"),
            ("AZURE_ACCESS_TOKEN", "token"),
            ("SFX_TOKEN", "sfx-token"),
        ],
        &["--json", "check", "--queries", queries.as_str(), "--extra-dimensions", "team=ops"],
    );
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert_eq!(report["descriptors"], 3);
    assert_eq!(report["sender"], "signalfx");
    assert_eq!(report["log_analytics"], true);
    assert_eq!(report["resource_graph"], false);
    assert_eq!(report["extra_dimensions"], "team=ops");
}

#[test]
fn check_fails_fast_on_invalid_query_records() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("queries.json");
    std::fs::write(&path, r#"[{"MetricName": "azure.requests"}]"#).unwrap();

    let output = querymetrics(
        temp.path(),
        &[
            ("LOG_ANALYTICS_WORKSPACE_GUID", "ws-1"),
            ("AZURE_ACCESS_TOKEN", "token"),
            ("SFX_TOKEN", "sfx-token"),
        ],
        &["check", "--queries", path.to_str().unwrap()],
    );
    assert!(!output.status.success());
}

#[test]
fn transform_prints_points_offline() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("result.json");
    std::fs::write(&path, serde_json::to_vec(&sample_table()).unwrap()).unwrap();

    let output = querymetrics(
        temp.path(),
        &[],
        &[
            "--json",
            "transform",
            path.to_str().unwrap(),
            "--extra-dimensions",
            "region=us",
        ],
    );
    assert!(output.status.success());

    let points = stdout_json(&output);
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[0]["value"], 42.0);
    assert_eq!(points[0]["dimensions"]["host"], "h1");
    assert_eq!(points[0]["dimensions"]["region"], "us");
}
