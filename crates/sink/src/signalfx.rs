use std::collections::BTreeMap;
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

const TOKEN_HEADER: &str = "X-SF-TOKEN";

#[derive(Debug, Clone)]
pub struct SignalFxConfig {
    pub token: String,
    pub realm: String,
    /// Overrides the realm-derived ingest URL, e.g. for a local proxy.
    pub ingest_endpoint: Option<String>,
}

impl SignalFxConfig {
    pub fn ingest_url(&self) -> String {
        let base = self
            .ingest_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://ingest.{}.signalfx.com", self.realm));
        format!("{}/v2/datapoint", base.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct Datapoint<'a> {
    metric: &'a str,
    value: f64,
    timestamp: i64,
    dimensions: &'a Dimensions,
}

/// Streaming ingest sender. The HTTP client, and with it the pooled
/// keep-alive connection, lives from `connect` until `close`.
pub struct SignalFxSender {
    client: Option<Client>,
    url: String,
    headers: HeaderMap,
    compression: SinkCompression,
}

impl SignalFxSender {
    pub fn connect(cfg: SignalFxConfig, compression: SinkCompression, timeout: Duration) -> Result<Self> {
        if cfg.token.trim().is_empty() {
            return Err(QueryMetricsError::Config(
                "SignalFx token is required".to_string(),
            ));
        }
        let url = cfg.ingest_url();
        info!(url = %url, "opening SignalFx ingest connection");
        Ok(Self {
            client: Some(build_client(timeout)?),
            url,
            headers: build_headers(TOKEN_HEADER, &cfg.token)?,
            compression,
        })
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl MetricsSender for SignalFxSender {
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
                "SignalFx connection is closed, cannot send {name}"
            )));
        };

        let datapoints: Vec<Datapoint<'_>> = points
            .iter()
            .map(|p| Datapoint {
                metric: name,
                value: p.value,
                timestamp: p.epoch_millis(),
                dimensions: &p.dimensions,
            })
            .collect();
        let payload = BTreeMap::from([(kind.as_str(), datapoints)]);
        debug!(metric = %name, kind = %kind, points = points.len(), "posting datapoints to SignalFx");

        let body = serde_json::to_vec(&payload)
            .map_err(|e| QueryMetricsError::Send(format!("failed to encode {name}: {e}")))?;
        post_json(client, &self.url, &self.headers, body, self.compression).await?;
        info!(metric = %name, "sent metrics to SignalFx");
        Ok(())
    }

    fn close(&mut self) {
        if self.client.take().is_some() {
            info!("SignalFx ingest connection closed");
        }
    }

    fn backend_name(&self) -> &'static str {
        "signalfx"
    }
}
