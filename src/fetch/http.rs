use super::{media_type, FetchError, FetchedResponse, Fetcher};
use crate::config::HttpConfig;
use crate::util::{ensure_public_host, validate_link};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::redirect;
use std::time::Duration;

/// Accept header preferring HTML and feed documents.
const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/rss+xml,application/atom+xml,application/xml;q=0.9,*/*;q=0.5";

/// reqwest-backed [`Fetcher`].
///
/// Cheap to clone: the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
    allow_private_hosts: bool,
}

impl HttpFetcher {
    /// Builds a client with the configured user agent, timeout and redirect
    /// limit.
    ///
    /// Redirect targets go through the same private-host policy as the
    /// initial URL.
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let max_redirects = config.max_redirects;
        let allow_private_hosts = config.allow_private_hosts;

        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                return attempt.error("too many redirects");
            }
            if !allow_private_hosts && ensure_public_host(attempt.url()).is_err() {
                return attempt.error("redirect to a private host");
            }
            attempt.follow()
        });

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(policy)
            .build()?;

        Ok(Self {
            client,
            timeout,
            max_body_bytes: config.max_body_bytes,
            allow_private_hosts,
        })
    }

    async fn fetch_inner(&self, url: reqwest::Url) -> Result<FetchedResponse, FetchError> {
        let requested = url.to_string();
        let response = self
            .client
            .get(url)
            .header(ACCEPT, ACCEPT_VALUE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();
        let final_url = response.url().to_string();

        let body = read_limited_bytes(response, self.max_body_bytes).await?;

        Ok(FetchedResponse {
            url: requested,
            final_url,
            status: status.as_u16(),
            mime_type,
            body: body.into(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let parsed = validate_link(url).map_err(FetchError::InvalidUrl)?;
        if !self.allow_private_hosts {
            ensure_public_host(&parsed).map_err(FetchError::Blocked)?;
        }

        let response = tokio::time::timeout(self.timeout, self.fetch_inner(parsed))
            .await
            .map_err(|_| FetchError::Timeout)?;

        match &response {
            Ok(r) => tracing::debug!(
                url = %url,
                status = r.status,
                mime = %r.mime_type,
                bytes = r.body.len(),
                "Fetched"
            ),
            Err(e) => tracing::debug!(url = %url, error = %e, "Fetch failed"),
        }

        response
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::LinkError;
    use wiremock::matchers::{header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> HttpConfig {
        HttpConfig {
            allow_private_hosts: true,
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_html_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .and(header_regex("user-agent", "^gleaner/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><body><p>Hi</p></body></html>")
                    .insert_header("Content-Type", "text/html; charset=utf-8"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let response = fetcher
            .fetch(&format!("{}/article", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.mime_type, "text/html");
        assert!(response.is_html());
        assert!(std::str::from_utf8(&response.body).unwrap().contains("<p>Hi</p>"));
    }

    #[tokio::test]
    async fn test_non_html_is_classified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0x25, 0x50, 0x44, 0x46])
                    .insert_header("Content-Type", "application/pdf"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let response = fetcher.fetch(&mock_server.uri()).await.unwrap();
        assert_eq!(response.mime_type, "application/pdf");
        assert!(!response.is_html());
    }

    #[tokio::test]
    async fn test_http_404_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let result = fetcher.fetch(&format!("{}/missing", mock_server.uri())).await;
        match result {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_500_is_reported_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let result = fetcher.fetch(&mock_server.uri()).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_body_ceiling_enforced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("x".repeat(2048))
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let config = HttpConfig {
            max_body_bytes: 1024,
            ..test_config()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let result = fetcher.fetch(&mock_server.uri()).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_redirect_followed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let response = fetcher
            .fetch(&format!("{}/old", mock_server.uri()))
            .await
            .unwrap();
        assert!(response.final_url.ends_with("/new"));
        assert!(response.url.ends_with("/old"));
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/loop", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;

        let config = HttpConfig {
            max_redirects: 2,
            ..test_config()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let result = fetcher.fetch(&format!("{}/loop", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let config = HttpConfig {
            timeout_secs: 1,
            ..test_config()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let result = fetcher.fetch(&mock_server.uri()).await;
        assert!(matches!(
            result,
            Err(FetchError::Timeout) | Err(FetchError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_private_host_blocked_by_default() {
        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:9/article").await;
        assert!(matches!(
            result,
            Err(FetchError::Blocked(LinkError::Localhost))
        ));

        let result = fetcher.fetch("http://192.168.1.1/article").await;
        assert!(matches!(result, Err(FetchError::Blocked(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_without_request() {
        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let result = fetcher.fetch("not-a-url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }
}
