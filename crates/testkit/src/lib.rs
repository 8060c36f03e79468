use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use flate2::read::GzDecoder;
use querymetrics_core::dimensions::Dimensions;
use querymetrics_core::model::descriptor::QueryDescriptor;
use querymetrics_core::model::metric::MetricPoint;
use querymetrics_core::model::table::TabularResult;
use serde_json::{Value, json};

/// Three one-minute observations across two hosts.
pub fn sample_table() -> TabularResult {
    TabularResult::new(
        ["timestamp", "host", "region", "metric_value"],
        vec![
            vec![json!("2024-01-01T00:00:00Z"), json!("h1"), json!("eu"), json!(42)],
            vec![json!("2024-01-01T00:00:00Z"), json!("h2"), json!("eu"), json!(7)],
            vec![json!("2024-01-01T00:01:00Z"), json!("h1"), json!("eu"), json!(40.5)],
        ],
    )
}

pub fn sample_points() -> Vec<MetricPoint> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let dims = |host: &str| {
        Dimensions::from([
            ("host".to_string(), host.to_string()),
            ("region".to_string(), "eu".to_string()),
        ])
    };
    vec![
        MetricPoint {
            ts: base,
            value: 42.0,
            dimensions: dims("h1"),
        },
        MetricPoint {
            ts: base,
            value: 7.0,
            dimensions: dims("h2"),
        },
        MetricPoint {
            ts: base + Duration::minutes(1),
            value: 40.5,
            dimensions: dims("h1"),
        },
    ]
}

pub fn sample_descriptors(n: usize) -> Vec<QueryDescriptor> {
    (1..=n)
        .map(|i| QueryDescriptor::new(format!("azure.test.metric{i}"), format!("query-{i}")))
        .collect()
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Body as JSON, gunzipped first when the request was compressed.
    pub fn json(&self) -> Value {
        let raw = if self.header("content-encoding").as_deref() == Some("gzip") {
            let mut out = Vec::new();
            GzDecoder::new(self.body.as_slice())
                .read_to_end(&mut out)
                .unwrap();
            out
        } else {
            self.body.clone()
        };
        serde_json::from_slice(&raw).unwrap()
    }
}

#[derive(Clone)]
struct CaptureState {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    status: Arc<AtomicU16>,
}

/// In-process HTTP endpoint that records every request and answers with a
/// configurable status, standing in for a metrics backend.
#[derive(Clone)]
pub struct CaptureServer {
    pub addr: SocketAddr,
    state: CaptureState,
}

impl CaptureServer {
    pub async fn spawn() -> Self {
        let state = CaptureState {
            requests: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(202)),
        };
        let app = Router::new().fallback(capture).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn capture(
    State(state): State<CaptureState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.requests.lock().unwrap().push(CapturedRequest {
        path: uri.path().to_string(),
        headers,
        body: body.to_vec(),
    });
    StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
}
