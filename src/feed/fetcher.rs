use futures::StreamExt;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use crate::util::validate_feed_url;

/// Default limit on a feed body.
pub const DEFAULT_MAX_FEED_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Default bound on request plus body read.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Redirect hops followed before a fetch fails.
pub const MAX_REDIRECTS: usize = 5;

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/rdf+xml, \
                           application/xml;q=0.9, text/xml;q=0.9, */*;q=0.1";

pub(crate) const HTML_ACCEPT: &str =
    "text/html, application/xhtml+xml, application/xml;q=0.9, */*;q=0.8";

/// Errors that can occur while retrieving a feed body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Knobs shared by the single-feed and batch ingestion paths.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Bound on request plus body read.
    pub timeout: Duration,
    pub max_body_bytes: usize,
    pub user_agent: String,
    /// Permit localhost and private-range feed URLs.
    pub allow_private_hosts: bool,
    /// Feeds refreshed at once by a batch; 1 means strictly sequential.
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_FEED_BYTES,
            user_agent: format!("feedmill/{}", env!("CARGO_PKG_VERSION")),
            allow_private_hosts: false,
            concurrency: 1,
        }
    }
}

/// A successfully retrieved feed body.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub status: u16,
    /// Body decoded as UTF-8 (invalid sequences replaced), BOM removed.
    pub body: String,
}

/// Builds the HTTP client used for every fetch.
///
/// The client follows redirects through [`redirect_policy`], so the host
/// checks applied to a caller's URL also hold for wherever it redirects.
pub fn build_client(opts: &FetchOptions) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(redirect_policy(opts.allow_private_hosts))
        .build()
}

/// Create a redirect policy with loop detection and limited hops.
///
/// - Follows at most [`MAX_REDIRECTS`] hops
/// - Detects redirect loops (same URL appearing twice in chain)
/// - Re-validates every hop, rejecting localhost and private addresses
///   unless `allow_private_hosts` is set
/// - Logs redirect chain for debugging
pub fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        if let Err(e) = validate_feed_url(url.as_str(), allow_private_hosts) {
            tracing::warn!(to = %url, error = %e, "Rejected redirect target");
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len(),
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Fetches a feed body with a single timeout around request and body read.
///
/// # Errors
///
/// - [`FetchError::Timeout`] - the whole exchange exceeded `opts.timeout`
/// - [`FetchError::HttpStatus`] - the server answered with a non-2xx status
/// - [`FetchError::Network`] - connection, TLS or body stream failure
/// - [`FetchError::ResponseTooLarge`] - body exceeded `opts.max_body_bytes`
/// - [`FetchError::IncompleteResponse`] - body shorter than `Content-Length`
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchedFeed, FetchError> {
    fetch_document(client, url, opts, FEED_ACCEPT).await
}

/// [`fetch_feed`] with a caller-chosen `Accept` header.
pub(crate) async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
    accept: &str,
) -> Result<FetchedFeed, FetchError> {
    let exchange = async {
        let response = client
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, &opts.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, opts.max_body_bytes).await?;
        Ok::<_, FetchError>(FetchedFeed {
            status: status.as_u16(),
            body: decode_body(&bytes),
        })
    };

    match tokio::time::timeout(opts.timeout, exchange).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(url = %url, timeout_ms = opts.timeout.as_millis() as u64, "Fetch timed out");
            Err(FetchError::Timeout)
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

fn decode_body(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_owned(),
        None => text.into_owned(),
    }
}
