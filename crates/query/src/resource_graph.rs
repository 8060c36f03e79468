use std::sync::Arc;
use std::time::Duration;

use querymetrics_core::error::{QueryMetricsError, Result};
use querymetrics_core::model::table::TabularResult;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::credentials::{Credential, RESOURCE_GRAPH_SCOPE};
use crate::http::{azure_error_message, build_client, trim_endpoint};

const API_VERSION: &str = "2021-03-01";
/// Guards against a service that keeps handing out skip tokens.
const MAX_PAGES: usize = 100;

pub struct ResourceGraphClient {
    http: Client,
    endpoint: String,
    subscription_id: String,
    credential: Arc<Credential>,
}

#[derive(Deserialize)]
struct ResourcesResponse {
    #[serde(default)]
    data: Option<TabularResult>,
    #[serde(rename = "$skipToken", default)]
    skip_token: Option<String>,
}

impl ResourceGraphClient {
    pub fn new(
        endpoint: &str,
        subscription_id: &str,
        credential: Arc<Credential>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            endpoint: trim_endpoint(endpoint),
            subscription_id: subscription_id.to_string(),
            credential,
        })
    }

    /// Runs a Resource Graph query scoped to the configured subscription,
    /// following skip tokens until the result set is complete.
    pub async fn run_query(&self, query: &str) -> Result<TabularResult> {
        let token = self.credential.token(RESOURCE_GRAPH_SCOPE).await?;
        let url = format!(
            "{}/providers/Microsoft.ResourceGraph/resources?api-version={API_VERSION}",
            self.endpoint
        );

        let mut result: Option<TabularResult> = None;
        let mut skip_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut options = json!({ "resultFormat": "table" });
            if let Some(skip) = &skip_token {
                options["$skipToken"] = json!(skip);
            }
            let body = json!({
                "query": query,
                "subscriptions": [self.subscription_id],
                "options": options,
            });

            let page = self.fetch_page(&url, &token, &body).await?;
            if let Some(data) = page.data {
                match result.as_mut() {
                    Some(acc) => acc.rows.extend(data.rows),
                    None => result = Some(data),
                }
            }

            skip_token = page.skip_token.filter(|t| !t.is_empty());
            if skip_token.is_none() {
                return Ok(result.unwrap_or_default());
            }
            tracing::debug!("Resource Graph result truncated, fetching next page");
        }

        Err(QueryMetricsError::Query(format!(
            "Resource Graph query exceeded {MAX_PAGES} pages"
        )))
    }

    async fn fetch_page(
        &self,
        url: &str,
        token: &str,
        body: &serde_json::Value,
    ) -> Result<ResourcesResponse> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| QueryMetricsError::Query(format!("Resource Graph request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueryMetricsError::Query(format!(
                "error while querying Resource Graph ({status}): {}",
                azure_error_message(&body)
            )));
        }

        resp.json()
            .await
            .map_err(|e| QueryMetricsError::Query(format!("invalid Resource Graph response: {e}")))
    }
}
