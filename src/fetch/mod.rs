//! Outbound HTTP for article pages and feed documents.
//!
//! The [`Fetcher`] trait is the seam between the orchestrators and the
//! network. [`HttpFetcher`] is the reqwest-backed implementation; tests swap
//! in stubs that serve canned bodies.
//!
//! Response bodies are buffered once into an `Arc<[u8]>` so the readability
//! and metadata stages can both read them without re-fetching.

mod http;

use crate::util::LinkError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use http::HttpFetcher;

/// Errors that can occur while fetching a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL failed link validation before any request was made
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[source] LinkError),
    /// The URL (or a redirect target) points at a private or local host
    #[error("Blocked host: {0}")]
    Blocked(#[source] LinkError),
    /// Network-level error (DNS, connection, TLS, redirect loop, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the configured ceiling
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    /// Lower-cased media type from `Content-Type`, parameters removed.
    /// Empty when the server sent no content type.
    pub mime_type: String,
    pub body: Arc<[u8]>,
}

impl FetchedResponse {
    pub fn is_html(&self) -> bool {
        is_html_mime_type(&self.mime_type)
    }
}

/// Performs a single GET and returns the buffered response.
///
/// Implementations must report 4xx/5xx statuses as
/// [`FetchError::HttpStatus`] rather than panicking.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError>;
}

/// Fetches an article page. Failures are logged with the URL before being
/// returned; classification by media type is left to the caller.
pub async fn fetch_article(
    fetcher: &dyn Fetcher,
    url: &str,
) -> Result<FetchedResponse, FetchError> {
    match fetcher.fetch(url).await {
        Ok(response) => {
            tracing::debug!(
                url = %url,
                final_url = %response.final_url,
                mime = %response.mime_type,
                bytes = response.body.len(),
                "Fetched article"
            );
            Ok(response)
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Failed to fetch article");
            Err(e)
        }
    }
}

/// Reduces a `Content-Type` header value to its lower-cased media type.
///
/// ```
/// use gleaner::fetch::media_type;
///
/// assert_eq!(media_type("Text/HTML; charset=UTF-8"), "text/html");
/// ```
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Returns `true` for `text/html` and `application/xhtml+xml`, with or
/// without parameters such as `charset`.
pub fn is_html_mime_type(mime: &str) -> bool {
    matches!(
        media_type(mime).as_str(),
        "text/html" | "application/xhtml+xml"
    )
}
