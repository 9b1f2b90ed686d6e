//! GitHub issues API client
//!
//! Walks `?state=all&per_page=N&page=P` from page 1 until an empty page, a
//! rejected request or the configured page cap. Payloads are returned raw;
//! normalization happens afterwards in [`super::Normalizer`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::GithubConfig;
use crate::error::{Error, Result};

/// Why pagination ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page came back with no items
    EmptyPage,
    /// The API refused a page, or kept failing it after retries; earlier
    /// pages are kept
    Rejected(u16),
    /// `max_pages` pages were fetched
    PageLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EmptyPage => write!(f, "empty page"),
            StopReason::Rejected(status) => write!(f, "HTTP {}", status),
            StopReason::PageLimit => write!(f, "page limit"),
        }
    }
}

/// Raw payloads from one fetch
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub payloads: Vec<Value>,
    /// Pages that returned items
    pub pages: u32,
    pub stopped: StopReason,
}

/// Result of requesting one page
enum Page {
    Items(Vec<Value>),
    Rejected(StatusCode),
}

/// Async client for a GitHub issues endpoint
pub struct GithubClient {
    config: GithubConfig,
    http_client: reqwest::Client,
    endpoint: String,
}

impl GithubClient {
    /// Create a client from configuration.
    ///
    /// Requires `github.api_url`. The token, when present, is sent verbatim
    /// as a bearer token.
    pub fn new(config: GithubConfig) -> Result<Self> {
        config.validate()?;

        let endpoint = config
            .api_url
            .clone()
            .ok_or_else(|| Error::Config("github.api_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&config.accept)
                .map_err(|e| Error::Config(format!("invalid github.accept: {}", e)))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("issuedebt/", env!("CARGO_PKG_VERSION"))),
        );

        if let Some(token) = config.resolved_token() {
            let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Config(format!("invalid github token: {}", e)))?;
            auth_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth_value);
        } else {
            tracing::warn!("No GitHub token configured, requests are unauthenticated");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            endpoint,
        })
    }

    /// URL of one page (pages start at 1)
    pub fn page_url(&self, page: u32) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}state=all&per_page={}&page={}",
            self.endpoint, separator, self.config.per_page, page
        )
    }

    async fn fetch_page(&self, page: u32) -> Result<Page> {
        let url = self.page_url(page);
        tracing::debug!(%url, "Requesting page");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| Error::Fetch(format!("failed to parse response: {}", e)))?;
            match body {
                Value::Array(items) => Ok(Page::Items(items)),
                other => Err(Error::Fetch(format!(
                    "expected a JSON array on page {}, got {}",
                    page,
                    json_kind(&other)
                ))),
            }
        } else {
            Ok(Page::Rejected(status))
        }
    }

    /// Fetch one page, retrying transient failures with exponential backoff.
    async fn fetch_page_with_retry(&self, page: u32) -> Result<Page> {
        let mut last = None;
        let mut delay = Duration::from_millis(500);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying page {} (attempt {}/{}), waiting {:?}",
                    page,
                    attempt + 1,
                    self.config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }

            match self.fetch_page(page).await {
                Ok(Page::Rejected(status)) if is_transient_status(status) => {
                    tracing::warn!("Transient status fetching page {}: {}", page, status);
                    last = Some(Ok(Page::Rejected(status)));
                }
                Ok(result) => return Ok(result),
                Err(e) if is_retryable_error(&e) => {
                    tracing::warn!("Transient error fetching page {}: {}", page, e);
                    last = Some(Err(e));
                }
                Err(e) => return Err(e),
            }
        }

        last.unwrap_or_else(|| Err(Error::Fetch("max retries exceeded".to_string())))
    }

    /// Fetch every page.
    ///
    /// `on_page` is called after each non-empty page with the page number
    /// and the running payload count.
    pub async fn fetch_all<F>(&self, mut on_page: F) -> Result<FetchOutcome>
    where
        F: FnMut(u32, usize),
    {
        let mut payloads = Vec::new();
        let mut pages = 0;
        let mut stopped = StopReason::PageLimit;

        for page in 1..=self.config.max_pages {
            match self.fetch_page_with_retry(page).await? {
                Page::Items(items) if items.is_empty() => {
                    stopped = StopReason::EmptyPage;
                    break;
                }
                Page::Items(items) => {
                    pages += 1;
                    payloads.extend(items);
                    on_page(page, payloads.len());
                }
                Page::Rejected(status) => {
                    tracing::warn!(
                        page,
                        status = status.as_u16(),
                        "GitHub rejected page request, keeping earlier pages"
                    );
                    stopped = StopReason::Rejected(status.as_u16());
                    break;
                }
            }
        }

        tracing::info!(
            pages,
            payloads = payloads.len(),
            stopped = %stopped,
            "Fetched issues"
        );
        Ok(FetchOutcome {
            payloads,
            pages,
            stopped,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Server errors and rate limiting are worth another attempt
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Check if an error is retryable (transient)
fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Fetch(msg) => {
            msg.contains("timeout")
                || msg.contains("connection")
                || msg.starts_with("HTTP request failed")
        }
        _ => false,
    }
}

/// Blocking wrapper around [`GithubClient`] for synchronous callers.
pub struct SyncFetcher {
    inner: GithubClient,
    runtime: tokio::runtime::Runtime,
}

impl SyncFetcher {
    pub fn new(config: GithubConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Fetch(format!("failed to create runtime: {}", e)))?;

        Ok(Self {
            inner: GithubClient::new(config)?,
            runtime,
        })
    }

    pub fn client(&self) -> &GithubClient {
        &self.inner
    }

    /// Fetch every page (blocking)
    pub fn fetch_all<F>(&self, on_page: F) -> Result<FetchOutcome>
    where
        F: FnMut(u32, usize),
    {
        self.runtime.block_on(self.inner.fetch_all(on_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn config(url: &str) -> GithubConfig {
        GithubConfig {
            api_url: Some(url.to_string()),
            token: Some("secret".to_string()),
            per_page: 2,
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Serve canned page bodies over plain HTTP; one connection per request.
    fn serve(pages: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            for (status, body) in pages {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                    line.clear();
                }
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
        });

        format!("http://{}/repos/acme/widgets/issues", addr)
    }

    #[test]
    fn test_client_requires_api_url() {
        let err = GithubClient::new(GithubConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_page_url() {
        let client =
            GithubClient::new(config("https://api.github.com/repos/acme/widgets/issues/")).unwrap();
        assert_eq!(
            client.page_url(3),
            "https://api.github.com/repos/acme/widgets/issues?state=all&per_page=2&page=3"
        );

        let client =
            GithubClient::new(config("https://example.com/issues?labels=bug")).unwrap();
        assert_eq!(
            client.page_url(1),
            "https://example.com/issues?labels=bug&state=all&per_page=2&page=1"
        );
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let mut config = config("https://example.com/issues");
        config.token = Some("bad\ntoken".to_string());
        assert!(matches!(GithubClient::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::FORBIDDEN));
        assert!(is_retryable_error(&Error::Fetch(
            "HTTP request failed: timeout".to_string()
        )));
        assert!(!is_retryable_error(&Error::Fetch(
            "expected a JSON array on page 1, got an object".to_string()
        )));
        assert!(!is_retryable_error(&Error::Config("x".to_string())));
    }

    #[test]
    fn test_fetch_stops_on_empty_page() {
        let url = serve(vec![
            (200, r#"[{"id":1},{"id":2}]"#.to_string()),
            (200, r#"[{"id":3}]"#.to_string()),
            (200, "[]".to_string()),
        ]);
        let fetcher = SyncFetcher::new(config(&url)).unwrap();

        let mut seen = Vec::new();
        let outcome = fetcher
            .fetch_all(|page, total| seen.push((page, total)))
            .unwrap();

        assert_eq!(outcome.payloads.len(), 3);
        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.stopped, StopReason::EmptyPage);
        assert_eq!(seen, vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn test_fetch_keeps_pages_before_rejection() {
        let url = serve(vec![
            (200, r#"[{"id":1}]"#.to_string()),
            (403, r#"{"message":"rate limited"}"#.to_string()),
        ]);
        let fetcher = SyncFetcher::new(config(&url)).unwrap();

        let outcome = fetcher.fetch_all(|_, _| {}).unwrap();
        assert_eq!(outcome.payloads.len(), 1);
        assert_eq!(outcome.stopped, StopReason::Rejected(403));
    }

    #[test]
    fn test_fetch_keeps_pages_when_rate_limit_persists() {
        let url = serve(vec![
            (200, r#"[{"id":1},{"id":2}]"#.to_string()),
            (200, r#"[{"id":3}]"#.to_string()),
            (429, r#"{"message":"secondary rate limit"}"#.to_string()),
        ]);
        let fetcher = SyncFetcher::new(config(&url)).unwrap();

        let outcome = fetcher.fetch_all(|_, _| {}).unwrap();
        assert_eq!(outcome.payloads.len(), 3);
        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.stopped, StopReason::Rejected(429));
    }

    #[test]
    fn test_fetch_retries_server_error() {
        let url = serve(vec![
            (503, r#"{"message":"unavailable"}"#.to_string()),
            (200, r#"[{"id":1}]"#.to_string()),
            (200, "[]".to_string()),
        ]);
        let mut config = config(&url);
        config.max_retries = 1;
        let fetcher = SyncFetcher::new(config).unwrap();

        let outcome = fetcher.fetch_all(|_, _| {}).unwrap();
        assert_eq!(outcome.payloads.len(), 1);
        assert_eq!(outcome.stopped, StopReason::EmptyPage);
    }

    #[test]
    fn test_fetch_honors_page_limit() {
        let url = serve(vec![
            (200, r#"[{"id":1}]"#.to_string()),
            (200, r#"[{"id":2}]"#.to_string()),
        ]);
        let mut config = config(&url);
        config.max_pages = 2;
        let fetcher = SyncFetcher::new(config).unwrap();

        let outcome = fetcher.fetch_all(|_, _| {}).unwrap();
        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.stopped, StopReason::PageLimit);
    }

    #[test]
    fn test_fetch_rejects_non_array_body() {
        let url = serve(vec![(200, r#"{"id":1}"#.to_string())]);
        let fetcher = SyncFetcher::new(config(&url)).unwrap();

        let err = fetcher.fetch_all(|_, _| {}).unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }
}
