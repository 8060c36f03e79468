use std::collections::HashMap;
use std::time::{Duration, Instant};

use querymetrics_core::config::Config;
use querymetrics_core::error::{QueryMetricsError, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::http::{azure_error_message, build_client, trim_endpoint};

pub const LOG_ANALYTICS_SCOPE: &str = "https://api.loganalytics.io/.default";
pub const RESOURCE_GRAPH_SCOPE: &str = "https://management.azure.com/.default";

const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for the Azure query services.
pub enum Credential {
    /// Pre-acquired token, used as-is for every scope.
    Static(String),
    ClientSecret(ClientSecretCredential),
}

impl Credential {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if let Some(token) = &cfg.azure_access_token {
            return Ok(Self::Static(token.clone()));
        }

        match (
            &cfg.azure_tenant_id,
            &cfg.azure_client_id,
            &cfg.azure_client_secret,
        ) {
            (Some(tenant), Some(client_id), Some(secret)) => {
                Ok(Self::ClientSecret(ClientSecretCredential::new(
                    &cfg.azure_authority_host,
                    tenant,
                    client_id,
                    secret,
                    cfg.request_timeout,
                )?))
            }
            _ => Err(QueryMetricsError::Config(
                "no Azure credentials: set AZURE_ACCESS_TOKEN or AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET"
                    .to_string(),
            )),
        }
    }

    pub async fn token(&self, scope: &str) -> Result<String> {
        match self {
            Credential::Static(token) => Ok(token.clone()),
            Credential::ClientSecret(cred) => cred.token(scope).await,
        }
    }
}

pub struct ClientSecretCredential {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<HashMap<String, CachedToken>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            token_url: format!(
                "{}/{tenant_id}/oauth2/v2.0/token",
                trim_endpoint(authority_host)
            ),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub async fn token(&self, scope: &str) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(scope)
            && Instant::now() < cached.refresh_at
        {
            return Ok(cached.value.clone());
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| QueryMetricsError::Query(format!("token request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QueryMetricsError::Query(format!(
                "token request for {scope} rejected ({status}): {}",
                azure_error_message(&body)
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| QueryMetricsError::Query(format!("bad token response: {e}")))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        tracing::debug!(scope, lifetime_secs = lifetime.as_secs(), "acquired Azure token");

        cache.insert(
            scope.to_string(),
            CachedToken {
                value: token.access_token.clone(),
                refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
            },
        );
        Ok(token.access_token)
    }
}
