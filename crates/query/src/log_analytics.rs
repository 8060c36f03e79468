use std::sync::Arc;
use std::time::Duration;

use querymetrics_core::error::{QueryMetricsError, Result};
use querymetrics_core::model::table::TabularResult;
use reqwest::Client;
use serde::Deserialize;

use crate::credentials::{Credential, LOG_ANALYTICS_SCOPE};
use crate::http::{azure_error_message, build_client, trim_endpoint};

pub struct LogAnalyticsClient {
    http: Client,
    endpoint: String,
    workspace_id: String,
    credential: Arc<Credential>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<TabularResult>,
}

impl LogAnalyticsClient {
    pub fn new(
        endpoint: &str,
        workspace_id: &str,
        credential: Arc<Credential>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint: trim_endpoint(endpoint),
            workspace_id: workspace_id.to_string(),
            credential,
        })
    }

    /// Runs a Kusto query and returns the primary result table. A response
    /// without tables is an empty result.
    pub async fn run_query(&self, query: &str) -> Result<TabularResult> {
        let token = self.credential.token(LOG_ANALYTICS_SCOPE).await?;
        let url = format!("{}/v1/workspaces/{}/query", self.endpoint, self.workspace_id);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| {
                QueryMetricsError::Query(format!(
                    "Log Analytics {} request failed: {e}",
                    self.workspace_id
                ))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                workspace = %self.workspace_id,
                status = %status,
                "Log Analytics query rejected"
            );
            return Err(QueryMetricsError::Query(format!(
                "error while querying Log Analytics {}: {}",
                self.workspace_id,
                azure_error_message(&body)
            )));
        }

        let parsed: QueryResponse = resp.json().await.map_err(|e| {
            QueryMetricsError::Query(format!(
                "invalid Log Analytics response from {}: {e}",
                self.workspace_id
            ))
        })?;
        Ok(parsed.tables.into_iter().next().unwrap_or_default())
    }
}
