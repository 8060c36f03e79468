use std::sync::Arc;

use async_trait::async_trait;
use querymetrics_core::config::Config;
use querymetrics_core::error::{QueryMetricsError, Result};
use querymetrics_core::model::descriptor::QueryType;
use querymetrics_core::model::table::TabularResult;

use crate::credentials::Credential;
use crate::log_analytics::LogAnalyticsClient;
use crate::resource_graph::ResourceGraphClient;

/// Executes a query against the service selected by `query_type`.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn run_query(&self, query_type: QueryType, query: &str) -> Result<TabularResult>;

    fn supports(&self, query_type: QueryType) -> bool;
}

/// Routes queries to whichever Azure services are configured.
pub struct Backends {
    log_analytics: Option<LogAnalyticsClient>,
    resource_graph: Option<ResourceGraphClient>,
}

impl Backends {
    pub fn new(
        log_analytics: Option<LogAnalyticsClient>,
        resource_graph: Option<ResourceGraphClient>,
    ) -> Self {
        Self {
            log_analytics,
            resource_graph,
        }
    }

    /// Builds a client for every service with an identifier in `cfg`; the two
    /// clients share one credential.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if cfg.log_analytics_workspace_id.is_none() && cfg.subscription_id.is_none() {
            return Err(QueryMetricsError::Config(
                "neither LOG_ANALYTICS_WORKSPACE_GUID nor SUBSCRIPTION_ID is set".to_string(),
            ));
        }

        let credential = Arc::new(Credential::from_config(cfg)?);
        let log_analytics = cfg
            .log_analytics_workspace_id
            .as_deref()
            .map(|ws| {
                LogAnalyticsClient::new(
                    &cfg.log_analytics_endpoint,
                    ws,
                    credential.clone(),
                    cfg.request_timeout,
                )
            })
            .transpose()?;
        let resource_graph = cfg
            .subscription_id
            .as_deref()
            .map(|sub| {
                ResourceGraphClient::new(
                    &cfg.resource_graph_endpoint,
                    sub,
                    credential.clone(),
                    cfg.request_timeout,
                )
            })
            .transpose()?;

        Ok(Self::new(log_analytics, resource_graph))
    }
}

#[async_trait]
impl QueryBackend for Backends {
    async fn run_query(&self, query_type: QueryType, query: &str) -> Result<TabularResult> {
        match query_type {
            QueryType::LogAnalytics => match &self.log_analytics {
                Some(client) => client.run_query(query).await,
                None => Err(not_configured(query_type)),
            },
            QueryType::ResourceGraph => match &self.resource_graph {
                Some(client) => client.run_query(query).await,
                None => Err(not_configured(query_type)),
            },
        }
    }

    fn supports(&self, query_type: QueryType) -> bool {
        match query_type {
            QueryType::LogAnalytics => self.log_analytics.is_some(),
            QueryType::ResourceGraph => self.resource_graph.is_some(),
        }
    }
}

fn not_configured(query_type: QueryType) -> QueryMetricsError {
    QueryMetricsError::Query(format!("no {query_type} backend configured"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_builds_only_configured_backends() {
        let cfg = Config {
            log_analytics_workspace_id: Some("ws".to_string()),
            azure_access_token: Some("t".to_string()),
            ..Config::default()
        };
        let backends = Backends::from_config(&cfg).unwrap();
        assert!(backends.supports(QueryType::LogAnalytics));
        assert!(!backends.supports(QueryType::ResourceGraph));
    }

    #[test]
    fn from_config_without_targets_fails() {
        let cfg = Config {
            azure_access_token: Some("t".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            Backends::from_config(&cfg),
            Err(QueryMetricsError::Config(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_backend_fails_the_query() {
        let backends = Backends::new(None, None);
        let err = backends
            .run_query(QueryType::ResourceGraph, "Resources")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("resource_graph"));
    }
}
