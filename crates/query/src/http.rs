use std::time::Duration;

use querymetrics_core::error::{QueryMetricsError, Result};
use reqwest::Client;
use serde_json::Value;

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| QueryMetricsError::Config(format!("failed to build http client: {e}")))
}

/// Azure services report failures as `{"error": {"message": ...}}`; anything
/// else is passed through as the raw body.
pub(crate) fn azure_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

pub(crate) fn trim_endpoint(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_azure_error_message() {
        let body = r#"{"error":{"code":"BadArgumentError","message":"Query could not be parsed"}}"#;
        assert_eq!(azure_error_message(body), "Query could not be parsed");
        assert_eq!(azure_error_message("gateway timeout"), "gateway timeout");
    }
}
