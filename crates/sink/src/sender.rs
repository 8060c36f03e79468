use std::time::Duration;

use async_trait::async_trait;
use querymetrics_core::config::Config;
use querymetrics_core::error::{QueryMetricsError, Result};
use querymetrics_core::model::metric::{MetricKind, MetricPoint};
use tracing::info;

use crate::datadog::{DatadogConfig, DatadogSender};
use crate::signalfx::{SignalFxConfig, SignalFxSender};

/// Delivers metric points to an external time-series store.
#[async_trait]
pub trait MetricsSender: Send + Sync {
    /// Sends every point for `name` in a single backend call. Either the whole
    /// batch is accepted or the call fails with `QueryMetricsError::Send`.
    async fn send_metrics(
        &self,
        name: &str,
        kind: MetricKind,
        points: Vec<MetricPoint>,
    ) -> Result<()>;

    /// Releases the backend connection. Idempotent.
    fn close(&mut self);

    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkCompression {
    #[default]
    None,
    Gzip,
}

impl SinkCompression {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Self::Gzip,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub datadog: Option<DatadogConfig>,
    pub signalfx: Option<SignalFxConfig>,
    pub compression: SinkCompression,
    pub timeout: Duration,
}

impl SinkConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            datadog: cfg.datadog_api_key.clone().map(|api_key| DatadogConfig {
                api_key,
                api_host: cfg.datadog_api_host.clone(),
            }),
            signalfx: cfg.signalfx_token.clone().map(|token| SignalFxConfig {
                token,
                realm: cfg.signalfx_realm.clone(),
                ingest_endpoint: cfg.signalfx_ingest_endpoint.clone(),
            }),
            compression: SinkCompression::parse(&cfg.sink_compression),
            timeout: cfg.request_timeout,
        }
    }
}

/// The sender chosen for this process.
pub enum Sender {
    Datadog(DatadogSender),
    SignalFx(SignalFxSender),
}

/// Picks the first configured backend, Datadog before SignalFx. There is no
/// fallback sender: missing configuration is an error.
pub fn build_sender(cfg: &SinkConfig) -> Result<Sender> {
    if let Some(dd) = &cfg.datadog {
        info!(host = %dd.api_host, "using Datadog metrics sender");
        return Ok(Sender::Datadog(DatadogSender::new(
            dd.clone(),
            cfg.compression,
            cfg.timeout,
        )?));
    }
    if let Some(sfx) = &cfg.signalfx {
        info!(realm = %sfx.realm, "using SignalFx metrics sender");
        return Ok(Sender::SignalFx(SignalFxSender::connect(
            sfx.clone(),
            cfg.compression,
            cfg.timeout,
        )?));
    }
    Err(QueryMetricsError::Config(
        "no metrics backend configuration found: provide either Datadog (DD_API_KEY) or SignalFx (SFX_TOKEN) credentials"
            .to_string(),
    ))
}

#[async_trait]
impl MetricsSender for Sender {
    async fn send_metrics(
        &self,
        name: &str,
        kind: MetricKind,
        points: Vec<MetricPoint>,
    ) -> Result<()> {
        match self {
            Sender::Datadog(s) => s.send_metrics(name, kind, points).await,
            Sender::SignalFx(s) => s.send_metrics(name, kind, points).await,
        }
    }

    fn close(&mut self) {
        match self {
            Sender::Datadog(s) => s.close(),
            Sender::SignalFx(s) => s.close(),
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Sender::Datadog(s) => s.backend_name(),
            Sender::SignalFx(s) => s.backend_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(datadog: bool, signalfx: bool) -> SinkConfig {
        SinkConfig {
            datadog: datadog.then(|| DatadogConfig {
                api_key: "dd".to_string(),
                api_host: "https://api.datadoghq.eu".to_string(),
            }),
            signalfx: signalfx.then(|| SignalFxConfig {
                token: "sfx".to_string(),
                realm: "eu0".to_string(),
                ingest_endpoint: None,
            }),
            compression: SinkCompression::None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn datadog_wins_when_both_are_configured() {
        let sender = build_sender(&sink(true, true)).unwrap();
        assert_eq!(sender.backend_name(), "datadog");
    }

    #[test]
    fn signalfx_is_used_without_datadog() {
        let sender = build_sender(&sink(false, true)).unwrap();
        assert_eq!(sender.backend_name(), "signalfx");
    }

    #[test]
    fn missing_backend_is_a_configuration_error() {
        let err = build_sender(&sink(false, false)).err().unwrap();
        assert!(matches!(err, QueryMetricsError::Config(_)));
    }

    #[test]
    fn sink_config_maps_from_config() {
        let cfg = Config {
            signalfx_token: Some("tok".to_string()),
            signalfx_realm: "us1".to_string(),
            sink_compression: "GZIP".to_string(),
            ..Config::default()
        };
        let sink = SinkConfig::from_config(&cfg);
        assert!(sink.datadog.is_none());
        assert_eq!(sink.signalfx.unwrap().realm, "us1");
        assert_eq!(sink.compression, SinkCompression::Gzip);
    }

    #[test]
    fn compression_parse_variants() {
        assert_eq!(SinkCompression::parse("gzip"), SinkCompression::Gzip);
        assert_eq!(SinkCompression::parse("none"), SinkCompression::None);
        assert_eq!(SinkCompression::parse("zstd"), SinkCompression::None);
    }
}
