use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dimensions::ExtraDimensions;
use crate::error::{QueryMetricsError, Result};

pub const DEFAULT_DATADOG_API_HOST: &str = "https://api.datadoghq.eu";
pub const DEFAULT_SIGNALFX_REALM: &str = "eu0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub queries_path: PathBuf,
    pub log_analytics_workspace_id: Option<String>,
    pub subscription_id: Option<String>,
    pub extra_dimensions: ExtraDimensions,

    pub azure_tenant_id: Option<String>,
    pub azure_client_id: Option<String>,
    pub azure_client_secret: Option<String>,
    pub azure_access_token: Option<String>,
    pub azure_authority_host: String,
    pub log_analytics_endpoint: String,
    pub resource_graph_endpoint: String,

    pub datadog_api_key: Option<String>,
    pub datadog_api_host: String,
    pub signalfx_token: Option<String>,
    pub signalfx_realm: String,
    pub signalfx_ingest_endpoint: Option<String>,
    pub sink_compression: String,

    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queries_path: config_home().join("querymetrics/queries.toml"),
            log_analytics_workspace_id: None,
            subscription_id: None,
            extra_dimensions: ExtraDimensions::default(),
            azure_tenant_id: None,
            azure_client_id: None,
            azure_client_secret: None,
            azure_access_token: None,
            azure_authority_host: "https://login.microsoftonline.com".to_string(),
            log_analytics_endpoint: "https://api.loganalytics.io".to_string(),
            resource_graph_endpoint: "https://management.azure.com".to_string(),
            datadog_api_key: None,
            datadog_api_host: DEFAULT_DATADOG_API_HOST.to_string(),
            signalfx_token: None,
            signalfx_realm: DEFAULT_SIGNALFX_REALM.to_string(),
            signalfx_ingest_endpoint: None,
            sink_compression: "none".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Reads `config_path`, or the default file when `None`, then the
    /// environment. An explicit path must exist.
    pub fn load_with(config_path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = match config_path {
            Some(path) if !path.exists() => {
                return Err(QueryMetricsError::Config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            Some(path) => path.to_path_buf(),
            None => config_file_path(),
        };
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides();
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        apply_overrides(&mut cfg, load_env_overrides(), "environment")?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        let overrides = load_file_overrides(path)?.ok_or_else(|| {
            QueryMetricsError::Config(format!("config file {} not found", path.display()))
        })?;
        apply_overrides(&mut cfg, overrides, "config file")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    queries_path: Option<PathBuf>,
    log_analytics_workspace_id: Option<String>,
    subscription_id: Option<String>,
    extra_dimensions: Option<String>,
    azure_tenant_id: Option<String>,
    azure_client_id: Option<String>,
    azure_client_secret: Option<String>,
    azure_access_token: Option<String>,
    azure_authority_host: Option<String>,
    log_analytics_endpoint: Option<String>,
    resource_graph_endpoint: Option<String>,
    datadog_api_key: Option<String>,
    datadog_api_host: Option<String>,
    signalfx_token: Option<String>,
    signalfx_realm: Option<String>,
    signalfx_ingest_endpoint: Option<String>,
    sink_compression: Option<String>,
    request_timeout: Option<String>,
}

fn config_home() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"))
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("QUERYMETRICS_CONFIG") {
        return PathBuf::from(path);
    }
    config_home().join("querymetrics/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path).map_err(|e| {
        QueryMetricsError::Config(format!("failed reading {}: {e}", path.display()))
    })?;
    let parsed: ConfigOverrides = toml::from_str(&raw).map_err(|e| {
        QueryMetricsError::Config(format!("failed parsing {}: {e}", path.display()))
    })?;
    Ok(Some(parsed))
}

/// Reads the variable names the Azure Function deployment already uses.
fn load_env_overrides() -> ConfigOverrides {
    let non_empty = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

    ConfigOverrides {
        queries_path: non_empty("QUERIES_PATH").map(PathBuf::from),
        log_analytics_workspace_id: non_empty("LOG_ANALYTICS_WORKSPACE_GUID"),
        subscription_id: non_empty("SUBSCRIPTION_ID"),
        // A set but empty METRICS_EXTRA_DIMENSIONS still wins over the legacy name.
        extra_dimensions: env::var("METRICS_EXTRA_DIMENSIONS")
            .or_else(|_| env::var("SFX_EXTRA_DIMENSIONS"))
            .ok(),
        azure_tenant_id: non_empty("AZURE_TENANT_ID"),
        azure_client_id: non_empty("AZURE_CLIENT_ID"),
        azure_client_secret: non_empty("AZURE_CLIENT_SECRET"),
        azure_access_token: non_empty("AZURE_ACCESS_TOKEN"),
        azure_authority_host: non_empty("AZURE_AUTHORITY_HOST"),
        log_analytics_endpoint: non_empty("LOG_ANALYTICS_ENDPOINT"),
        resource_graph_endpoint: non_empty("RESOURCE_GRAPH_ENDPOINT"),
        datadog_api_key: non_empty("DD_API_KEY"),
        datadog_api_host: non_empty("DD_API_HOST"),
        signalfx_token: non_empty("SFX_TOKEN"),
        signalfx_realm: non_empty("SFX_REALM"),
        signalfx_ingest_endpoint: non_empty("SFX_INGEST_ENDPOINT"),
        sink_compression: non_empty("METRICS_COMPRESSION"),
        request_timeout: non_empty("QUERYMETRICS_REQUEST_TIMEOUT"),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.queries_path {
        cfg.queries_path = v;
    }
    if let Some(v) = overrides.log_analytics_workspace_id {
        cfg.log_analytics_workspace_id = Some(v);
    }
    if let Some(v) = overrides.subscription_id {
        cfg.subscription_id = Some(v);
    }
    if let Some(v) = overrides.extra_dimensions {
        cfg.extra_dimensions = ExtraDimensions::parse(&v).map_err(|e| {
            QueryMetricsError::Config(format!("bad extra_dimensions in {source}: {e}"))
        })?;
    }
    if let Some(v) = overrides.azure_tenant_id {
        cfg.azure_tenant_id = Some(v);
    }
    if let Some(v) = overrides.azure_client_id {
        cfg.azure_client_id = Some(v);
    }
    if let Some(v) = overrides.azure_client_secret {
        cfg.azure_client_secret = Some(v);
    }
    if let Some(v) = overrides.azure_access_token {
        cfg.azure_access_token = Some(v);
    }
    if let Some(v) = overrides.azure_authority_host {
        cfg.azure_authority_host = v;
    }
    if let Some(v) = overrides.log_analytics_endpoint {
        cfg.log_analytics_endpoint = v;
    }
    if let Some(v) = overrides.resource_graph_endpoint {
        cfg.resource_graph_endpoint = v;
    }
    if let Some(v) = overrides.datadog_api_key {
        cfg.datadog_api_key = Some(v);
    }
    if let Some(v) = overrides.datadog_api_host {
        cfg.datadog_api_host = v;
    }
    if let Some(v) = overrides.signalfx_token {
        cfg.signalfx_token = Some(v);
    }
    if let Some(v) = overrides.signalfx_realm {
        cfg.signalfx_realm = v;
    }
    if let Some(v) = overrides.signalfx_ingest_endpoint {
        cfg.signalfx_ingest_endpoint = Some(v);
    }
    if let Some(v) = overrides.sink_compression {
        cfg.sink_compression = v;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = humantime::parse_duration(&v).map_err(|e| {
            QueryMetricsError::Config(format!("bad request_timeout in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}
