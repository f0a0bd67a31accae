use std::sync::Arc;

use ccp_config::HttpConfig;
use reqwest::header::{CONTENT_RANGE, RANGE, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, info};

use crate::error::{DownloadError, Result};

lazy_static::lazy_static! {
    static ref SHARED_CLIENT: Client = Client::new();
}

/// The default client shared by every download in the process; connection
/// pooling across copies is the point.
pub(crate) fn shared_client() -> Client {
    SHARED_CLIENT.clone()
}

/// Attaches the configured User-Agent and the one extra `key:value` header.
pub(crate) fn apply_headers(mut request: RequestBuilder, http: &HttpConfig) -> RequestBuilder {
    if !http.user_agent.is_empty() {
        request = request.header(USER_AGENT, &http.user_agent);
    }
    if !http.extra_header.is_empty() {
        if let Some((key, value)) = http.extra_header.split_once(':') {
            request = request.header(key, value);
        }
    }
    request
}

/// Rewrites a leading `https://` to `http://` when the insecure downgrade is
/// enabled; presigned URLs stay valid either way and plain HTTP skips the
/// TLS handshake.
pub fn apply_insecure(url: &str, insecure: bool) -> String {
    match url.strip_prefix("https://") {
        Some(rest) if insecure => {
            info!(url, "downgrading to http");
            format!("http://{rest}")
        },
        _ => url.to_string(),
    }
}

/// Determines the object length with a one-byte ranged GET; the response's
/// `Content-Range` header carries the total size. A 416 means the object is
/// empty.
pub async fn probe_size(client: &Client, url: &str, http: &HttpConfig) -> Result<u64> {
    let request = apply_headers(client.get(url), http).header(RANGE, "bytes=0-0");
    let response = request
        .send()
        .await
        .map_err(|err| DownloadError::ProbeFailed(Arc::new(err)))?;

    let status = response.status();
    if status == StatusCode::RANGE_NOT_SATISFIABLE {
        return Ok(0);
    }
    if status.as_u16() >= 400 {
        return Err(DownloadError::ProbeStatus(status));
    }

    let size = response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_range_total)
        .ok_or_else(|| DownloadError::UnknownSize(url.to_string()))?;
    debug!(url, size, "size probe");
    Ok(size)
}

/// Parses the TOTAL out of `bytes A-B/TOTAL`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.strip_prefix("bytes ")?.rsplit_once('/')?.1.trim().parse().ok()
}
