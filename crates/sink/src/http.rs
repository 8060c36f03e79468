use std::io::Write;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use querymetrics_core::error::{QueryMetricsError, Result};
use reqwest::Client;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::sender::SinkCompression;

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| QueryMetricsError::Config(format!("failed to build sink http client: {e}")))
}

/// Builds the static header set for a backend; the secret header value is
/// marked sensitive so it never shows up in debug output.
pub(crate) fn build_headers(auth_header: &str, secret: &str) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    let name = HeaderName::try_from(auth_header)
        .map_err(|e| QueryMetricsError::Config(format!("invalid header {auth_header}: {e}")))?;
    let mut value = HeaderValue::try_from(secret)
        .map_err(|e| QueryMetricsError::Config(format!("invalid value for {auth_header}: {e}")))?;
    value.set_sensitive(true);
    out.insert(name, value);
    out.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(out)
}

/// Posts one JSON payload. No retries: a failed call fails the whole batch.
pub(crate) async fn post_json(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
    body: Vec<u8>,
    compression: SinkCompression,
) -> Result<()> {
    let (body, content_encoding) = maybe_compress_body(body, compression)
        .map_err(|e| QueryMetricsError::Send(format!("failed to compress payload: {e}")))?;

    let mut req = client.post(url).headers(headers.clone());
    if let Some(encoding) = content_encoding {
        req = req.header(CONTENT_ENCODING, encoding);
    }

    let resp = req
        .body(body)
        .send()
        .await
        .map_err(|e| QueryMetricsError::Send(format!("POST {url} failed: {e}")))?;

    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let text = resp.text().await.unwrap_or_default();
    Err(QueryMetricsError::Send(format!(
        "POST {url} rejected with {status}: {}",
        text.trim()
    )))
}

fn maybe_compress_body(
    body: Vec<u8>,
    compression: SinkCompression,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    match compression {
        SinkCompression::None => Ok((body, None)),
        SinkCompression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&body)?;
            let compressed = encoder.finish()?;
            Ok((compressed, Some("gzip")))
        }
    }
}
