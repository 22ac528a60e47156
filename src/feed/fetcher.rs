use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;

use crate::feed::parser::{parse_feed, ParseError, ParsedItem};
use crate::feed::source::FeedSource;
use crate::feed::trending::parse_trending;
use crate::types::RawEntry;
use crate::util::{host_of, normalize_url, normalize_ws};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Some feed hosts reject requests without a browser-like agent.
pub const USER_AGENT: &str = "Mozilla/5.0";

/// Platform label given to trending-page entries.
pub const TRENDING_PLATFORM: &str = "GitHub";

/// Errors that can occur while fetching one source.
///
/// Endpoint-level failures are wrapped in [`FetchError::Exhausted`] once every
/// candidate endpoint of a source has been tried.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Connect plus read window elapsed
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Endpoint served an HTML page (login wall, WAF block) instead of a feed
    #[error("Non-feed HTML response")]
    BlockedPage,
    /// Feed parsed but contained no usable items
    #[error("Feed contained no entries")]
    Empty,
    /// Feed XML was malformed beyond repair
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Every candidate endpoint failed
    #[error("Failed after {attempts} endpoint(s), last={last_url}: {source}")]
    Exhausted {
        attempts: usize,
        last_url: String,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Transport-level failures worth another attempt on the same endpoint.
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout => true,
            FetchError::IncompleteResponse { .. } => true,
            FetchError::HttpStatus(code) => *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Timeouts
// ============================================================================

/// Connect and read windows for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Timeouts {
    pub const fn from_secs(connect: u64, read: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect),
            read: Duration::from_secs(read),
        }
    }

    /// Upper bound for one request including the body transfer.
    pub fn total(&self) -> Duration {
        self.connect + self.read
    }
}

/// Per-domain timeout tuning.
///
/// Slow but valuable hosts get longer windows so one sluggish endpoint does
/// not cost its whole source.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutPolicy {
    pub default: Timeouts,
    /// Host substring → timeouts; the first match wins.
    pub hosts: Vec<(String, Timeouts)>,
    pub trending: Timeouts,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default: Timeouts::from_secs(5, 12),
            hosts: vec![
                ("v2ex.com".to_string(), Timeouts::from_secs(10, 18)),
                ("rsshub.app".to_string(), Timeouts::from_secs(8, 18)),
            ],
            trending: Timeouts::from_secs(5, 18),
        }
    }
}

impl TimeoutPolicy {
    /// The same windows for every URL.
    pub fn uniform(timeouts: Timeouts) -> Self {
        Self {
            default: timeouts,
            hosts: Vec::new(),
            trending: timeouts,
        }
    }

    pub fn for_url(&self, url: &str) -> Timeouts {
        if url.starts_with(crate::feed::source::TRENDING_URL_PREFIX) {
            return self.trending;
        }
        let host = host_of(url);
        self.hosts
            .iter()
            .find(|(h, _)| host.contains(h.as_str()))
            .map(|(_, t)| *t)
            .unwrap_or(self.default)
    }

    fn all(&self) -> impl Iterator<Item = Timeouts> + '_ {
        std::iter::once(self.default)
            .chain(self.hosts.iter().map(|(_, t)| *t))
            .chain(std::iter::once(self.trending))
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Options applied to every request a [`Fetcher`] makes.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra attempts per endpoint after a retryable failure.
    pub retries: u32,
    pub retry_sleep: Duration,
    /// Proxy URL for all schemes.
    pub proxy: Option<String>,
    /// Bind outgoing connections to an IPv4 local address.
    pub prefer_ipv4: bool,
    pub timeouts: TimeoutPolicy,
}

/// Shared HTTP fetcher. Cloning is cheap; clones share connection pools.
#[derive(Debug, Clone)]
pub struct Fetcher {
    inner: Arc<FetcherInner>,
}

#[derive(Debug)]
struct FetcherInner {
    default_client: reqwest::Client,
    /// One client per distinct connect timeout.
    clients: BTreeMap<Duration, reqwest::Client>,
    options: FetchOptions,
}

fn build_client(options: &FetchOptions, connect: Duration) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(connect)
        .redirect(reqwest::redirect::Policy::limited(10));
    if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    if options.prefer_ipv4 {
        builder = builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
    Ok(builder.build()?)
}

impl Fetcher {
    /// Builds the HTTP clients for every timeout profile in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the proxy URL is invalid or the TLS
    /// backend cannot be initialized.
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let default_client = build_client(&options, options.timeouts.default.connect)?;
        let mut clients = BTreeMap::new();
        for t in options.timeouts.all() {
            if !clients.contains_key(&t.connect) {
                clients.insert(t.connect, build_client(&options, t.connect)?);
            }
        }
        Ok(Self {
            inner: Arc::new(FetcherInner {
                default_client,
                clients,
                options,
            }),
        })
    }

    fn client_for(&self, timeouts: Timeouts) -> &reqwest::Client {
        self.inner
            .clients
            .get(&timeouts.connect)
            .unwrap_or(&self.inner.default_client)
    }

    /// Fetches one source and returns its entries in document order, truncated
    /// to `cap`.
    ///
    /// Candidate endpoints are the primary URL followed by the fallbacks. The
    /// first endpoint that yields at least one entry wins; HTML pages, empty
    /// feeds and transport errors move on to the next candidate.
    ///
    /// Trending pages are scraped instead and stamped with `report_date`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Exhausted`] carrying the last endpoint error when
    /// every candidate fails.
    pub async fn fetch_source(
        &self,
        source: &FeedSource,
        cap: usize,
        report_date: &str,
    ) -> Result<Vec<RawEntry>, FetchError> {
        if source.is_trending() {
            return self.fetch_trending(source, report_date).await;
        }

        let endpoints = source.endpoints();
        let mut last_err: Option<(String, FetchError)> = None;

        for endpoint in &endpoints {
            match self.fetch_endpoint(endpoint).await {
                Ok(items) => {
                    if last_err.is_some() {
                        tracing::info!(source = %source.url, endpoint = %endpoint, "Fallback endpoint succeeded");
                    }
                    let entries = items
                        .into_iter()
                        .take(cap)
                        .map(|item| RawEntry {
                            source_name: source.name.clone(),
                            source_url: source.url.clone(),
                            platform: source.name.clone(),
                            title: item.title,
                            url: normalize_url(&item.link),
                            description: item.description,
                            published: item.published,
                            enclosure_mime: item.enclosure_mime,
                        })
                        .collect();
                    return Ok(entries);
                }
                Err(e) => {
                    tracing::debug!(source = %source.url, endpoint = %endpoint, error = %e, "Endpoint failed");
                    last_err = Some((endpoint.to_string(), e));
                }
            }
        }

        let (last_url, source_err) = last_err.unwrap_or_else(|| (source.url.clone(), FetchError::Empty));
        Err(FetchError::Exhausted {
            attempts: endpoints.len(),
            last_url,
            source: Box::new(source_err),
        })
    }

    async fn fetch_endpoint(&self, url: &str) -> Result<Vec<ParsedItem>, FetchError> {
        let bytes = self.get_with_retries(url).await?;
        match parse_feed(&bytes) {
            Ok(items) if !items.is_empty() => Ok(items),
            Ok(_) if looks_like_html(&bytes) => Err(FetchError::BlockedPage),
            Ok(_) => Err(FetchError::Empty),
            Err(_) if looks_like_html(&bytes) => Err(FetchError::BlockedPage),
            Err(e) => Err(FetchError::Parse(e)),
        }
    }

    async fn fetch_trending(
        &self,
        source: &FeedSource,
        report_date: &str,
    ) -> Result<Vec<RawEntry>, FetchError> {
        let bytes = self.get_with_retries(&source.url).await.map_err(|e| FetchError::Exhausted {
            attempts: 1,
            last_url: source.url.clone(),
            source: Box::new(e),
        })?;
        let html = String::from_utf8_lossy(&bytes);
        let repos = parse_trending(&html);
        if repos.is_empty() {
            tracing::warn!(source = %source.url, "Trending page yielded no repositories");
        }
        Ok(repos
            .into_iter()
            .map(|r| RawEntry {
                source_name: source.name.clone(),
                source_url: source.url.clone(),
                platform: TRENDING_PLATFORM.to_string(),
                title: r.slug,
                url: normalize_url(&r.url),
                description: normalize_ws(&r.description),
                published: Some(report_date.to_string()),
                enclosure_mime: None,
            })
            .collect())
    }

    /// GETs `url`, retrying transport errors and 5xx with a fixed sleep.
    /// Other non-2xx statuses fail immediately.
    async fn get_with_retries(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let options = &self.inner.options;
        let timeouts = options.timeouts.for_url(url);
        let client = self.client_for(timeouts);
        let mut attempt = 0;

        loop {
            let result = tokio::time::timeout(timeouts.total(), get_once(client, url))
                .await
                .unwrap_or(Err(FetchError::Timeout));

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < options.retries => {
                    attempt += 1;
                    tracing::debug!(
                        endpoint = %url,
                        attempt = attempt,
                        error = %e,
                        "Retrying after transient error"
                    );
                    if !options.retry_sleep.is_zero() {
                        tokio::time::sleep(options.retry_sleep).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn get_once(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    read_limited_bytes(response, MAX_FEED_SIZE).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
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

fn looks_like_html(bytes: &[u8]) -> bool {
    bytes.windows(5).any(|w| w.eq_ignore_ascii_case(b"<html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>One</title><link>https://x.example/1?utm_source=rss</link><description>first</description></item>
    <item><title>Two</title><link>https://x.example/2</link></item>
    <item><title>Three</title><link>https://x.example/3</link></item>
</channel></rss>"#;

    const EMPTY_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel></channel></rss>"#;

    fn fetcher(retries: u32) -> Fetcher {
        Fetcher::new(FetchOptions {
            retries,
            timeouts: TimeoutPolicy::uniform(Timeouts {
                connect: Duration::from_secs(2),
                read: Duration::from_millis(500),
            }),
            ..FetchOptions::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_truncates_and_normalizes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("X", format!("{}/feed", mock_server.uri()));
        let entries = fetcher(0).fetch_source(&source, 2, "2025-01-06").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://x.example/1");
        assert_eq!(entries[0].platform, "X");
        assert_eq!(entries[1].title, "Two");
    }

    #[tokio::test]
    async fn test_404_fails_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("X", format!("{}/feed", mock_server.uri()));
        let err = fetcher(3).fetch_source(&source, 10, "2025-01-06").await.unwrap_err();
        match err {
            FetchError::Exhausted { attempts, source, .. } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, FetchError::HttpStatus(404)));
            }
            e => panic!("Expected Exhausted, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_500_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // Initial request + 2 retries
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("X", format!("{}/feed", mock_server.uri()));
        let err = fetcher(2).fetch_source(&source, 10, "2025-01-06").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Exhausted { source, .. } if matches!(*source, FetchError::HttpStatus(500))
        ));
    }

    #[tokio::test]
    async fn test_503_retry_then_success() {
        use wiremock::matchers::any;

        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("X", format!("{}/feed", mock_server.uri()));
        let entries = fetcher(1).fetch_source(&source, 10, "2025-01-06").await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let f = Fetcher::new(FetchOptions {
            timeouts: TimeoutPolicy::uniform(Timeouts {
                connect: Duration::from_millis(100),
                read: Duration::from_millis(200),
            }),
            ..FetchOptions::default()
        })
        .unwrap();
        let source = FeedSource::new("X", format!("{}/feed", mock_server.uri()));
        let err = f.fetch_source(&source, 10, "2025-01-06").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Exhausted { source, .. } if matches!(*source, FetchError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_blocked_page_falls_back() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/primary"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<!DOCTYPE html><html><body>Access denied</body></html>"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_RSS))
            .mount(&mock_server)
            .await;
        Mock::given(path("/mirror"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let source = FeedSource::new("X", format!("{base}/primary"))
            .with_fallbacks([format!("{base}/empty"), format!("{base}/mirror")]);
        let entries = fetcher(0).fetch_source(&source, 10, "2025-01-06").await.unwrap();
        assert_eq!(entries.len(), 3);
        // Entries keep the declared source URL even when served by a mirror.
        assert_eq!(entries[0].source_url, format!("{base}/primary"));
    }

    #[tokio::test]
    async fn test_all_endpoints_fail_reports_last() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
            .mount(&mock_server)
            .await;
        Mock::given(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_RSS))
            .mount(&mock_server)
            .await;

        let base = mock_server.uri();
        let source = FeedSource::new("X", format!("{base}/a")).with_fallbacks([format!("{base}/b")]);
        let err = fetcher(0).fetch_source(&source, 10, "2025-01-06").await.unwrap_err();
        match err {
            FetchError::Exhausted {
                attempts,
                last_url,
                source,
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_url, format!("{base}/b"));
                assert!(matches!(*source, FetchError::Empty));
            }
            e => panic!("Expected Exhausted, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss><channel><item></rss>"))
            .mount(&mock_server)
            .await;

        let source = FeedSource::new("X", format!("{}/feed", mock_server.uri()));
        let err = fetcher(0).fetch_source(&source, 10, "2025-01-06").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Exhausted { source, .. } if matches!(*source, FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_timeout_policy_per_domain() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.for_url("https://www.v2ex.com/index.xml"), Timeouts::from_secs(10, 18));
        assert_eq!(policy.for_url("https://rsshub.app/zhihu/hot"), Timeouts::from_secs(8, 18));
        assert_eq!(
            policy.for_url("https://github.com/trending?since=daily"),
            Timeouts::from_secs(5, 18)
        );
        assert_eq!(policy.for_url("https://sspai.com/feed"), Timeouts::from_secs(5, 12));
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html(b"<!doctype html><HTML lang=en>"));
        assert!(!looks_like_html(b"<rss></rss>"));
    }
}
