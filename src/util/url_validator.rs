use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors produced when a candidate article or feed link is rejected.
///
/// `InvalidUrl`, `UnsupportedScheme` and `MissingHost` are shape errors: the
/// link is never fetchable. `Localhost` and `PrivateIp` are policy errors
/// raised only by [`ensure_public_host`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The string could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component (or an empty one).
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates that `candidate` is an absolute, fetchable http(s) link.
///
/// Leading and trailing whitespace is ignored. No network access happens here.
///
/// # Errors
///
/// - [`LinkError::InvalidUrl`] for relative paths, empty strings and garbage
/// - [`LinkError::UnsupportedScheme`] for `javascript:`, `ftp:`, `file:` and friends
/// - [`LinkError::MissingHost`] when the host is absent or empty
///
/// # Examples
///
/// ```
/// use gleaner::util::validate_link;
///
/// let url = validate_link("https://example.com/a").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_link("/relative/path").is_err());
/// assert!(validate_link("javascript:alert(1)").is_err());
/// ```
pub fn validate_link(candidate: &str) -> Result<Url, LinkError> {
    let url = Url::parse(candidate.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(LinkError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(LinkError::MissingHost),
    }
}

/// Returns `true` if `candidate` is an absolute http(s) URL with a host.
///
/// Total: any malformed input yields `false`.
pub fn is_valid_link(candidate: &str) -> bool {
    validate_link(candidate).is_ok()
}

/// Rejects URLs that resolve to the local machine or a private network.
///
/// Only literal hosts are inspected; DNS names other than `localhost` pass.
pub fn ensure_public_host(url: &Url) -> Result<(), LinkError> {
    let Some(host) = url.host_str() else {
        return Err(LinkError::MissingHost);
    };

    if host.eq_ignore_ascii_case("localhost") {
        return Err(LinkError::Localhost);
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(LinkError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(LinkError::PrivateIp(ip.to_string()));
        }
    }

    Ok(())
}

/// Canonical cache-key form of a link.
///
/// The fragment is dropped and scheme/host are lower-cased by the URL parser.
/// Input that does not parse is returned trimmed so that callers can still use
/// it as an opaque key.
pub fn normalize_link(link: &str) -> String {
    match Url::parse(link.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => link.trim().to_owned(),
    }
}

/// Derives a display site name from a link: its host without a leading `www.`.
///
/// ```
/// use gleaner::util::site_name_from_link;
///
/// assert_eq!(site_name_from_link("https://www.example.com/a").as_deref(), Some("example.com"));
/// assert_eq!(site_name_from_link("not a url"), None);
/// ```
pub fn site_name_from_link(link: &str) -> Option<String> {
    let url = validate_link(link).ok()?;
    let host = url.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_owned())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
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
