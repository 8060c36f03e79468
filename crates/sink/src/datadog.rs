use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use querymetrics_core::dimensions::Dimensions;
use querymetrics_core::error::{QueryMetricsError, Result};
use querymetrics_core::model::metric::{MetricKind, MetricPoint};
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::http::{build_client, build_headers, post_json};
use crate::sender::{MetricsSender, SinkCompression};

const API_KEY_HEADER: &str = "DD-API-KEY";

#[derive(Debug, Clone)]
pub struct DatadogConfig {
    pub api_key: String,
    pub api_host: String,
}

/// Points sharing one dimension set, as `(epoch_millis, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub dimensions: Dimensions,
    pub points: Vec<(i64, f64)>,
}

/// Groups points by identical dimension sets, keeping first-seen group order
/// and row order inside each group.
pub fn group_by_dimensions(points: Vec<MetricPoint>) -> Vec<TimeSeries> {
    let mut index: HashMap<Dimensions, usize> = HashMap::new();
    let mut series: Vec<TimeSeries> = Vec::new();
    for point in points {
        let millis = point.epoch_millis();
        match index.get(&point.dimensions) {
            Some(&i) => series[i].points.push((millis, point.value)),
            None => {
                index.insert(point.dimensions.clone(), series.len());
                series.push(TimeSeries {
                    dimensions: point.dimensions,
                    points: vec![(millis, point.value)],
                });
            }
        }
    }
    series
}

pub fn datadog_type(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Gauge => "gauge",
        MetricKind::Counter | MetricKind::CumulativeCounter => "count",
    }
}

#[derive(Serialize)]
struct SeriesPayload<'a> {
    series: Vec<SeriesBody<'a>>,
}

#[derive(Serialize)]
struct SeriesBody<'a> {
    metric: &'a str,
    #[serde(rename = "type")]
    metric_type: &'static str,
    /// `[epoch_seconds, value]`, the resolution the series API accepts.
    points: Vec<(i64, f64)>,
    tags: Vec<String>,
}

/// Aggregated-batch sender for the Datadog series API.
pub struct DatadogSender {
    client: Option<Client>,
    url: String,
    headers: HeaderMap,
    compression: SinkCompression,
}

impl DatadogSender {
    pub fn new(cfg: DatadogConfig, compression: SinkCompression, timeout: Duration) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            return Err(QueryMetricsError::Config(
                "Datadog API key is required".to_string(),
            ));
        }
        debug!(host = %cfg.api_host, "initializing Datadog metrics sender");
        Ok(Self {
            client: Some(build_client(timeout)?),
            url: format!("{}/api/v1/series", cfg.api_host.trim_end_matches('/')),
            headers: build_headers(API_KEY_HEADER, &cfg.api_key)?,
            compression,
        })
    }
}

#[async_trait]
impl MetricsSender for DatadogSender {
    async fn send_metrics(
        &self,
        name: &str,
        kind: MetricKind,
        points: Vec<MetricPoint>,
    ) -> Result<()> {
        if points.is_empty() {
            warn!(metric = %name, "no metrics data to send");
            return Ok(());
        }
        let Some(client) = &self.client else {
            return Err(QueryMetricsError::Send(format!(
                "Datadog sender is closed, cannot send {name}"
            )));
        };

        let series = group_by_dimensions(points);
        let payload = SeriesPayload {
            series: series
                .iter()
                .map(|ts| SeriesBody {
                    metric: name,
                    metric_type: datadog_type(kind),
                    points: ts
                        .points
                        .iter()
                        .map(|(millis, value)| (millis.div_euclid(1000), *value))
                        .collect(),
                    tags: ts
                        .dimensions
                        .iter()
                        .map(|(k, v)| format!("{k}:{v}"))
                        .collect(),
                })
                .collect(),
        };
        debug!(metric = %name, series = series.len(), "sending series to Datadog");

        let body = serde_json::to_vec(&payload)
            .map_err(|e| QueryMetricsError::Send(format!("failed to encode {name}: {e}")))?;
        post_json(client, &self.url, &self.headers, body, self.compression).await?;
        info!(metric = %name, "sent metrics to Datadog");
        Ok(())
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("Datadog sender closed");
        }
    }

    fn backend_name(&self) -> &'static str {
        "datadog"
    }
}
