use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during feed URL validation.
///
/// Validation happens before any network activity, so these are always
/// reported straight back to the caller that supplied the URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// No URL was supplied (empty or whitespace only).
    #[error("Feed URL is required")]
    Missing,
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a feed URL supplied by a caller.
///
/// Rejects empty input, unparseable URLs, non-HTTP(S) schemes and URLs
/// without a host. Unless `allow_private_hosts` is set, localhost and private
/// address ranges (RFC 1918, link-local, unique local IPv6) are rejected too,
/// which keeps a server deployment from being used to reach into its own network.
///
/// Returns the trimmed, parsed [`Url`].
///
/// # Examples
///
/// ```
/// use feedmill::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/feed.xml", false).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("", false).is_err());
/// assert!(validate_feed_url("file:///etc/passwd", false).is_err());
/// assert!(validate_feed_url("http://192.168.1.1/feed", false).is_err());
/// assert!(validate_feed_url("http://192.168.1.1/feed", true).is_ok());
/// ```
pub fn validate_feed_url(
    url_str: &str,
    allow_private_hosts: bool,
) -> Result<Url, UrlValidationError> {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return Err(UrlValidationError::Missing);
    }

    let url = Url::parse(trimmed)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if allow_private_hosts {
        return Ok(url);
    }

    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlValidationError::Localhost);
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => ipv4.is_private() || ipv4.is_link_local() || ipv4.is_unspecified(),
        IpAddr::V6(ipv6) => {
            if ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
