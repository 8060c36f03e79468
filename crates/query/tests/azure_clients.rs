use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use querymetrics_core::error::QueryMetricsError;
use querymetrics_core::model::descriptor::QueryType;
use querymetrics_query::credentials::Credential;
use querymetrics_query::log_analytics::LogAnalyticsClient;
use querymetrics_query::resource_graph::ResourceGraphClient;
use querymetrics_query::{Backends, QueryBackend};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

async fn log_analytics_query(
    State(seen): State<Seen>,
    Path(workspace): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    seen.bodies.lock().unwrap().push(body.clone());
    if let Some(auth) = headers.get("authorization") {
        seen.auth
            .lock()
            .unwrap()
            .push(auth.to_str().unwrap_or_default().to_string());
    }

    match (workspace.as_str(), body["query"].as_str()) {
        (_, Some("broken")) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": "BadArgumentError", "message": "syntax error near broken"}})),
        ),
        (_, Some("empty")) => (StatusCode::OK, Json(json!({}))),
        _ => (
            StatusCode::OK,
            Json(json!({
                "tables": [{
                    "name": "PrimaryResult",
                    "columns": [
                        {"name": "timestamp", "type": "datetime"},
                        {"name": "host", "type": "string"},
                        {"name": "metric_value", "type": "long"}
                    ],
                    "rows": [["2024-01-01T00:00:00Z", "h1", 42]]
                }]
            })),
        ),
    }
}

async fn resource_graph_query(
    State(seen): State<Seen>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    seen.bodies.lock().unwrap().push(body.clone());
    let columns = json!([
        {"name": "timestamp", "type": "string"},
        {"name": "location", "type": "string"},
        {"name": "metric_value", "type": "integer"}
    ]);
    if body["options"]["$skipToken"].as_str() == Some("page2") {
        return (
            StatusCode::OK,
            Json(json!({
                "totalRecords": 2,
                "count": 1,
                "data": {"columns": columns, "rows": [["2024-01-01T00:00:00Z", "westus", 3]]}
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "totalRecords": 2,
            "count": 1,
            "$skipToken": "page2",
            "data": {"columns": columns, "rows": [["2024-01-01T00:00:00Z", "westeurope", 5]]}
        })),
    )
}

async fn spawn_fake_azure(seen: Seen) -> SocketAddr {
    let app = Router::new()
        .route("/v1/workspaces/{workspace}/query", post(log_analytics_query))
        .route(
            "/providers/Microsoft.ResourceGraph/resources",
            post(resource_graph_query),
        )
        .with_state(seen);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn credential() -> Arc<Credential> {
    Arc::new(Credential::Static("test-token".to_string()))
}

#[tokio::test]
async fn log_analytics_returns_primary_table() -> anyhow::Result<()> {
    let seen = Seen::default();
    let addr = spawn_fake_azure(seen.clone()).await;
    let client = LogAnalyticsClient::new(
        &format!("http://{addr}/"),
        "ws-1",
        credential(),
        Duration::from_secs(5),
    )?;

    let table = client.run_query("AppRequests | summarize").await?;
    assert_eq!(table.column_index("host"), Some(1));
    assert_eq!(table.rows, vec![vec![json!("2024-01-01T00:00:00Z"), json!("h1"), json!(42)]]);
    assert_eq!(seen.auth.lock().unwrap()[0], "Bearer test-token");
    assert_eq!(
        seen.bodies.lock().unwrap()[0],
        json!({"query": "AppRequests | summarize"})
    );
    Ok(())
}

#[tokio::test]
async fn log_analytics_error_carries_service_message() -> anyhow::Result<()> {
    let addr = spawn_fake_azure(Seen::default()).await;
    let client = LogAnalyticsClient::new(
        &format!("http://{addr}"),
        "ws-1",
        credential(),
        Duration::from_secs(5),
    )?;

    let err = client.run_query("broken").await.unwrap_err();
    assert!(matches!(&err, QueryMetricsError::Query(msg) if msg.contains("syntax error near broken")));
    Ok(())
}

#[tokio::test]
async fn log_analytics_without_tables_is_empty() -> anyhow::Result<()> {
    let addr = spawn_fake_azure(Seen::default()).await;
    let client = LogAnalyticsClient::new(
        &format!("http://{addr}"),
        "ws-1",
        credential(),
        Duration::from_secs(5),
    )?;

    assert!(client.run_query("empty").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn resource_graph_follows_skip_tokens() -> anyhow::Result<()> {
    let seen = Seen::default();
    let addr = spawn_fake_azure(seen.clone()).await;
    let client = ResourceGraphClient::new(
        &format!("http://{addr}"),
        "sub-1",
        credential(),
        Duration::from_secs(5),
    )?;

    let table = client.run_query("Resources | summarize").await?;
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1][1], json!("westus"));

    let bodies = seen.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["subscriptions"], json!(["sub-1"]));
    assert_eq!(bodies[0]["options"]["resultFormat"], json!("table"));
    assert_eq!(bodies[1]["options"]["$skipToken"], json!("page2"));
    Ok(())
}

#[tokio::test]
async fn backends_route_by_query_type() -> anyhow::Result<()> {
    let addr = spawn_fake_azure(Seen::default()).await;
    let endpoint = format!("http://{addr}");
    let backends = Backends::new(
        Some(LogAnalyticsClient::new(
            &endpoint,
            "ws-1",
            credential(),
            Duration::from_secs(5),
        )?),
        Some(ResourceGraphClient::new(
            &endpoint,
            "sub-1",
            credential(),
            Duration::from_secs(5),
        )?),
    );

    let la = backends.run_query(QueryType::LogAnalytics, "q").await?;
    let rg = backends.run_query(QueryType::ResourceGraph, "q").await?;
    assert_eq!(la.rows.len(), 1);
    assert_eq!(rg.rows.len(), 2);
    Ok(())
}
