//! Remote retrieval that streams the response body straight to disk.
//!
//! # Security
//!
//! Remote sources are frequently pre-signed URLs. Only the URL path is ever
//! logged and raw `reqwest` errors (which embed the full URL) never reach
//! error messages.

use std::path::Path;
use std::time::Instant;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;
use url::Url;

use crate::config::StagingConfig;
use crate::error::SplitError;

/// Returns the URL path only; scheme, host, query and fragment are stripped.
pub(crate) fn sanitize_url_for_logs(url: &Url) -> String {
    url.path().to_string()
}

/// Builds an HTTP client honoring the configured timeout and user agent.
fn build_http_client(config: &StagingConfig) -> Result<reqwest::Client, SplitError> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(&config.user_agent)
        .unwrap_or_else(|_| HeaderValue::from_static("halfsplit"));
    headers.insert(USER_AGENT, agent);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.fetch_timeout)
        .build()
        .map_err(|e| SplitError::SourceUnavailable(format!("Failed to build HTTP client: {}", e)))
}

/// Describes a transport error without echoing the URL it carries.
fn describe_transport_error(error: &reqwest::Error, config: &StagingConfig) -> String {
    if error.is_timeout() {
        format!(
            "Timed out after {} seconds",
            config.fetch_timeout.as_secs_f64()
        )
    } else if error.is_connect() {
        "Could not connect to the server".to_string()
    } else if error.is_body() || error.is_decode() {
        "The download was interrupted".to_string()
    } else {
        "The request failed".to_string()
    }
}

/// Validates the scheme of a caller-supplied URL.
pub(crate) fn parse_remote_url(raw: &str) -> Result<Url, SplitError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| SplitError::SourceUnavailable(format!("Invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SplitError::SourceUnavailable(format!(
            "Unsupported URL scheme '{}'; use http or https",
            other
        ))),
    }
}

/// Downloads `url` into a new file at `dest`, returning the byte count.
///
/// Any transport failure, timeout or non-success status is
/// `SourceUnavailable`. A partially written `dest` is left for the caller's
/// scoped temp directory to remove.
pub(crate) async fn download(
    url: &Url,
    dest: &Path,
    config: &StagingConfig,
) -> Result<u64, SplitError> {
    let client = build_http_client(config)?;
    let sanitized_url = sanitize_url_for_logs(url);
    let start = Instant::now();

    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            info!(
                "[FETCH] GET {} FAILED {}ms",
                sanitized_url,
                start.elapsed().as_millis()
            );
            return Err(SplitError::SourceUnavailable(describe_transport_error(
                &e, config,
            )));
        }
    };

    let status = response.status();
    info!(
        "[FETCH] GET {} {} {}ms",
        sanitized_url,
        status.as_u16(),
        start.elapsed().as_millis()
    );

    if !status.is_success() {
        return Err(SplitError::SourceUnavailable(format!(
            "The server responded with HTTP {}",
            status.as_u16()
        )));
    }

    let mut file = File::create(dest).await.map_err(|e| {
        SplitError::SourceUnavailable(format!("Failed to create download file: {}", e))
    })?;

    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| SplitError::SourceUnavailable(describe_transport_error(&e, config)))?;
        file.write_all(&chunk).await.map_err(|e| {
            SplitError::SourceUnavailable(format!("Error writing download to disk: {}", e))
        })?;
        total_bytes += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| {
        SplitError::SourceUnavailable(format!("Error flushing download to disk: {}", e))
    })?;

    info!(
        "[FETCH] GET {} complete, {} bytes in {}ms",
        sanitized_url,
        total_bytes,
        start.elapsed().as_millis()
    );

    Ok(total_bytes)
}
