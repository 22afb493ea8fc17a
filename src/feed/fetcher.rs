use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH, USER_AGENT};
use reqwest::redirect::Policy;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::discovery::find_feed_link_in_html;
use super::headers::{
    etag_from_header, header_blob, http_date, last_modified_from_header, quoted_etag,
};
use super::model::Feed;
use super::parser::{parse, FeedError};
use crate::config::Config;

/// HTTP status reported in place of a feed when the server says "not modified".
pub const NOT_MODIFIED: u16 = 304;

/// Status of a [`FetchFailure`] that never got an HTTP response.
pub const TRANSPORT_FAILURE: u16 = 0;

pub const DEFAULT_USER_AGENT: &str = concat!("feedpull/", env!("CARGO_PKG_VERSION"));

/// Client-wide fetch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub user_agent: String,
    /// Bounds the whole request: connect, redirects and body
    pub timeout: Duration,
    /// Width of the rolling window for batch fetches
    pub max_in_flight: usize,
    pub max_feed_size: usize,
    pub max_redirects: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FetchOptions {
    fn from(config: &Config) -> Self {
        Self {
            user_agent: config
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            timeout: config.timeout(),
            max_in_flight: config.max_in_flight.max(1),
            max_feed_size: config.max_feed_size_bytes,
            max_redirects: config.max_redirects,
        }
    }
}

/// Per-request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides [`FetchOptions::user_agent`] for this request
    pub user_agent: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_none_match: Option<String>,
}

impl RequestOptions {
    /// Conditional GET against the caching headers stored on `feed`.
    pub fn conditional_for(feed: &Feed) -> Self {
        Self {
            user_agent: None,
            if_modified_since: feed.last_modified,
            if_none_match: feed.etag.clone(),
        }
    }
}

/// What came back for one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Fetched(T),
    /// The server answered 304 to a conditional request
    NotModified,
    Failed(FetchFailure),
}

impl<T> FetchOutcome<T> {
    /// The HTTP status this outcome stands for; 200 for any fetched value.
    pub fn status(&self) -> u16 {
        match self {
            Self::Fetched(_) => 200,
            Self::NotModified => NOT_MODIFIED,
            Self::Failed(failure) => failure.status,
        }
    }

    pub fn fetched(self) -> Option<T> {
        match self {
            Self::Fetched(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, Self::NotModified)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            Self::Fetched(value) => FetchOutcome::Fetched(f(value)),
            Self::NotModified => FetchOutcome::NotModified,
            Self::Failed(failure) => FetchOutcome::Failed(failure),
        }
    }
}

/// A non-2xx, non-304 response, or no response at all.
///
/// `status == 0` with empty `headers` and `body` means the request never got
/// an HTTP answer (timeout, DNS failure, refused connection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// The URL as requested, before redirects
    pub url: String,
    pub status: u16,
    /// Raw CRLF header block, including the status line
    pub headers: String,
    pub body: String,
}

impl FetchFailure {
    fn transport(url: &str) -> Self {
        Self {
            url: url.to_string(),
            status: TRANSPORT_FAILURE,
            headers: String::new(),
            body: String::new(),
        }
    }

    pub fn is_transport(&self) -> bool {
        self.status == TRANSPORT_FAILURE
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_transport() {
            write!(f, "{}: no response", self.url)
        } else {
            write!(f, "{}: HTTP {}", self.url, self.status)
        }
    }
}

/// A successful response, unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeed {
    /// The URL as requested
    pub url: String,
    /// Where redirects ended up
    pub final_url: String,
    pub status: u16,
    pub headers: String,
    pub body: String,
}

impl RawFeed {
    pub fn etag(&self) -> Option<String> {
        etag_from_header(&self.headers)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        last_modified_from_header(&self.headers)
    }

    /// Stamps transport metadata onto a feed parsed from this response.
    fn stamp(&self, mut feed: Feed) -> Feed {
        feed.feed_url = Some(self.final_url.clone());
        feed.etag = self.etag();
        feed.last_modified = self.last_modified();
        feed
    }
}

/// Reasons a request produced no usable body.
///
/// `Network` and `Timeout` before the response head arrives become
/// [`TRANSPORT_FAILURE`]; anything while reading the body keeps the real status.
#[derive(Debug, Error)]
enum TransportError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("response too large")]
    ResponseTooLarge,
    #[error("incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Concurrent HTTP fetching of feed documents.
///
/// Single-URL calls return one [`FetchOutcome`]; batch calls return a map
/// keyed by the requested URL, or a stream of `(url, outcome)` pairs in
/// completion order. At most [`FetchOptions::max_in_flight`] requests of a
/// batch are in flight; as each completes the next queued URL starts.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl Fetcher {
    /// # Errors
    ///
    /// [`FeedError::Client`] if the TLS backend or resolver cannot start.
    pub fn new(options: FetchOptions) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .redirect(redirect_policy(options.max_redirects))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(options.timeout)
            .build()?;
        Ok(Self { client, options })
    }

    pub fn from_config(config: &Config) -> Result<Self, FeedError> {
        Self::new(FetchOptions::from(config))
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// GETs `url` without parsing the body.
    ///
    /// # Arguments
    ///
    /// * `url` - The feed URL; redirects are followed up to `max_redirects`
    /// * `options` - Conditional headers and an optional User-Agent override
    ///
    /// # Returns
    ///
    /// - [`FetchOutcome::Fetched`] for a 2xx response, with the raw header block
    /// - [`FetchOutcome::NotModified`] for a 304
    /// - [`FetchOutcome::Failed`] for any other status, or a body that could not
    ///   be read in full, with the real status and headers
    /// - [`FetchOutcome::Failed`] with status [`TRANSPORT_FAILURE`] when no
    ///   response arrived (DNS, refused connection, redirect limit, timeout)
    ///
    /// # Behavior
    ///
    /// - The whole request is bounded by [`FetchOptions::timeout`]
    /// - Bodies over [`FetchOptions::max_feed_size`] are abandoned mid-stream
    /// - Bodies are decoded as UTF-8, replacing invalid sequences
    pub async fn fetch_raw(&self, url: &str, options: &RequestOptions) -> FetchOutcome<RawFeed> {
        let request = self.build_request(url, options);

        let response = match tokio::time::timeout(self.options.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return transport_failure(url, TransportError::Network(e)),
            Err(_) => return transport_failure(url, TransportError::Timeout),
        };

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = header_blob(status, response.headers());

        if status.as_u16() == NOT_MODIFIED {
            tracing::debug!(url = %url, "Feed not modified");
            return FetchOutcome::NotModified;
        }

        let body = match read_limited_bytes(response, self.options.max_feed_size).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            // The server did answer, so the failure keeps its status and headers
            Err(e) => {
                tracing::warn!(
                    url = %url,
                    status = status.as_u16(),
                    limit = self.options.max_feed_size,
                    error = %e,
                    "Failed to read feed body"
                );
                return FetchOutcome::Failed(FetchFailure {
                    url: url.to_string(),
                    status: status.as_u16(),
                    headers,
                    body: String::new(),
                });
            }
        };

        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "Feed request failed");
            return FetchOutcome::Failed(FetchFailure {
                url: url.to_string(),
                status: status.as_u16(),
                headers,
                body,
            });
        }

        if final_url != url {
            tracing::debug!(url = %url, final_url = %final_url, "Feed moved");
        }

        FetchOutcome::Fetched(RawFeed {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            headers,
            body,
        })
    }

    /// Fetches and parses `url`.
    ///
    /// The feed's `feed_url` is the final URL after redirects, and its `etag`
    /// and `last_modified` come from the response headers. When the body is
    /// an HTML page advertising a feed with `<link rel="alternate">`, that
    /// link is fetched once in its place.
    ///
    /// # Errors
    ///
    /// [`FeedError::NoParserAvailable`] when neither the body nor a page's
    /// advertised feed is a recognised format. Network problems are never
    /// errors; they are [`FetchOutcome::Failed`].
    pub async fn fetch_and_parse(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<FetchOutcome<Feed>, FeedError> {
        let raw = match self.fetch_raw(url, options).await {
            FetchOutcome::Fetched(raw) => raw,
            FetchOutcome::NotModified => return Ok(FetchOutcome::NotModified),
            FetchOutcome::Failed(failure) => return Ok(FetchOutcome::Failed(failure)),
        };

        match parse(&raw.body) {
            Ok(feed) => Ok(FetchOutcome::Fetched(raw.stamp(feed))),
            Err(FeedError::NoParserAvailable) => self.follow_advertised_feed(&raw, options).await,
            Err(e) => Err(e),
        }
    }

    async fn follow_advertised_feed(
        &self,
        page: &RawFeed,
        options: &RequestOptions,
    ) -> Result<FetchOutcome<Feed>, FeedError> {
        let Some(feed_url) = find_feed_link_in_html(&page.body, &page.final_url) else {
            return Err(FeedError::NoParserAvailable);
        };
        tracing::debug!(page = %page.final_url, feed_url = %feed_url, "Following advertised feed");

        // Caching headers belong to the page, not the feed it points at
        let options = RequestOptions {
            user_agent: options.user_agent.clone(),
            ..Default::default()
        };
        match self.fetch_raw(&feed_url, &options).await {
            FetchOutcome::Fetched(raw) => Ok(FetchOutcome::Fetched(raw.stamp(parse(&raw.body)?))),
            FetchOutcome::NotModified => Ok(FetchOutcome::NotModified),
            FetchOutcome::Failed(failure) => Ok(FetchOutcome::Failed(failure)),
        }
    }

    /// Raw responses for many URLs, in completion order.
    pub fn fetch_raw_stream<'a>(
        &'a self,
        urls: Vec<String>,
        options: &'a RequestOptions,
    ) -> impl Stream<Item = (String, FetchOutcome<RawFeed>)> + 'a {
        stream::iter(dedup(urls))
            .map(move |url| async move {
                let outcome = self.fetch_raw(&url, options).await;
                (url, outcome)
            })
            .buffer_unordered(self.options.max_in_flight.max(1))
    }

    /// Parsed feeds for many URLs, in completion order.
    pub fn fetch_and_parse_stream<'a>(
        &'a self,
        urls: Vec<String>,
        options: &'a RequestOptions,
    ) -> impl Stream<Item = (String, Result<FetchOutcome<Feed>, FeedError>)> + 'a {
        stream::iter(dedup(urls))
            .map(move |url| async move {
                let outcome = self.fetch_and_parse(&url, options).await;
                (url, outcome)
            })
            .buffer_unordered(self.options.max_in_flight.max(1))
    }

    /// Raw responses keyed by requested URL.
    ///
    /// # Arguments
    ///
    /// * `urls` - URLs to fetch; repeats are fetched once
    /// * `options` - Headers sent with every request of the batch
    ///
    /// # Returns
    ///
    /// A map with exactly one entry per distinct URL, even for a single URL.
    ///
    /// # Behavior
    ///
    /// - At most [`FetchOptions::max_in_flight`] requests run at once
    /// - A slot frees as soon as its request completes, and the next URL starts
    /// - A failure for one URL never affects the others
    pub async fn fetch_raw_all<I, S>(
        &self,
        urls: I,
        options: &RequestOptions,
    ) -> HashMap<String, FetchOutcome<RawFeed>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls = urls.into_iter().map(Into::into).collect();
        self.fetch_raw_stream(urls, options).collect().await
    }

    /// Parsed feeds keyed by requested URL.
    ///
    /// # Arguments
    ///
    /// * `urls` - URLs to fetch; repeats are fetched once
    /// * `options` - Headers sent with every request of the batch
    ///
    /// # Returns
    ///
    /// A map with exactly one entry per distinct URL. A URL whose body matches
    /// no parser maps to `Err(FeedError::NoParserAvailable)`.
    ///
    /// # Behavior
    ///
    /// Same rolling window as [`Fetcher::fetch_raw_all`]. Each feed is stamped
    /// as in [`Fetcher::fetch_and_parse`], including HTML discovery.
    pub async fn fetch_and_parse_all<I, S>(
        &self,
        urls: I,
        options: &RequestOptions,
    ) -> HashMap<String, Result<FetchOutcome<Feed>, FeedError>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls = urls.into_iter().map(Into::into).collect();
        self.fetch_and_parse_stream(urls, options).collect().await
    }

    fn build_request(&self, url: &str, options: &RequestOptions) -> reqwest::RequestBuilder {
        let user_agent = options
            .user_agent
            .as_deref()
            .unwrap_or(&self.options.user_agent);
        let mut request = self.client.get(url).header(USER_AGENT, user_agent);

        if let Some(since) = options.if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, http_date(since));
        }
        if let Some(etag) = &options.if_none_match {
            request = request.header(IF_NONE_MATCH, quoted_etag(etag));
        }
        request
    }
}

fn transport_failure<T>(url: &str, error: TransportError) -> FetchOutcome<T> {
    tracing::warn!(url = %url, error = %error, "Feed request failed without a response");
    FetchOutcome::Failed(FetchFailure::transport(url))
}

/// Drops repeated URLs, keeping first-seen order.
fn dedup(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn redirect_policy(max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= max_redirects {
            return attempt.error(format!("Too many redirects (max {max_redirects})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(TransportError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(TransportError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test Feed</title>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchOptions::default()).unwrap()
    }

    async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn unused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/feed")
    }

    #[tokio::test]
    async fn test_fetch_success_stamps_transport_metadata() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .insert_header("Content-Type", "application/xml")
                .insert_header("ETag", "\"abc\"")
                .insert_header("Last-Modified", "Wed, 28 Jan 2009 04:10:32 GMT"),
        )
        .await;

        let url = format!("{}/feed", server.uri());
        let outcome = fetcher()
            .fetch_and_parse(&url, &RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.status(), 200);
        let feed = outcome.fetched().unwrap();
        assert_eq!(feed.title.as_deref(), Some("Test Feed"));
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.feed_url.as_deref(), Some(url.as_str()));
        assert_eq!(feed.etag.as_deref(), Some("\"abc\""));
        assert_eq!(
            feed.last_modified,
            Some(Utc.with_ymd_and_hms(2009, 1, 28, 4, 10, 32).unwrap())
        );
    }

    #[tokio::test]
    async fn test_etag_conditional_get_returns_not_modified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions {
            if_none_match: Some("v1".to_string()),
            ..Default::default()
        };
        let outcome = fetcher()
            .fetch_and_parse(&format!("{}/feed", server.uri()), &options)
            .await
            .unwrap();

        assert!(outcome.is_not_modified());
        assert_eq!(outcome.status(), NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_if_modified_since_is_an_http_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(|req: &Request| {
                req.headers
                    .get("if-modified-since")
                    .and_then(|v| v.to_str().ok())
                    == Some("Wed, 28 Jan 2009 04:10:32 GMT")
            })
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let options = RequestOptions {
            if_modified_since: Some(Utc.with_ymd_and_hms(2009, 1, 28, 4, 10, 32).unwrap()),
            ..Default::default()
        };
        let outcome = fetcher()
            .fetch_raw(&format!("{}/feed", server.uri()), &options)
            .await;
        assert!(outcome.is_not_modified());
    }

    #[tokio::test]
    async fn test_user_agent_override() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("User-Agent", "custom-agent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions {
            user_agent: Some("custom-agent/1.0".to_string()),
            ..Default::default()
        };
        let outcome = fetcher()
            .fetch_raw(&format!("{}/feed", server.uri()), &options)
            .await;
        assert_eq!(outcome.status(), 200);
    }

    #[tokio::test]
    async fn test_http_error_carries_status_headers_and_body() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            ResponseTemplate::new(404).set_body_string("nothing here"),
        )
        .await;

        let url = format!("{}/feed", server.uri());
        let outcome = fetcher()
            .fetch_and_parse(&url, &RequestOptions::default())
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Failed(failure) => {
                assert_eq!(failure.url, url);
                assert_eq!(failure.status, 404);
                assert!(failure.headers.starts_with("HTTP/1.1 404"));
                assert_eq!(failure.body, "nothing here");
                assert!(!failure.is_transport());
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let url = unused_url();
        let outcome = fetcher()
            .fetch_and_parse(&url, &RequestOptions::default())
            .await
            .unwrap();

        match outcome {
            FetchOutcome::Failed(failure) => {
                assert_eq!(failure.status, 0);
                assert!(failure.headers.is_empty());
                assert!(failure.body.is_empty());
                assert!(failure.is_transport());
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/slow",
            ResponseTemplate::new(200)
                .set_body_string(VALID_RSS)
                .set_delay(Duration::from_secs(5)),
        )
        .await;

        let fetcher = Fetcher::new(FetchOptions {
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        let outcome = fetcher
            .fetch_raw(&format!("{}/slow", server.uri()), &RequestOptions::default())
            .await;
        assert_eq!(outcome.status(), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_a_failure() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/big",
            ResponseTemplate::new(200).set_body_string(VALID_RSS),
        )
        .await;

        let fetcher = Fetcher::new(FetchOptions {
            max_feed_size: 16,
            ..Default::default()
        })
        .unwrap();
        match fetcher
            .fetch_raw(&format!("{}/big", server.uri()), &RequestOptions::default())
            .await
        {
            FetchOutcome::Failed(failure) => {
                assert_eq!(failure.status, 200);
                assert!(failure.body.is_empty());
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_truncated_body_keeps_status_and_headers() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/feed", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 500\r\nETag: \"cut\"\r\n\r\n<rss version=",
                )
                .await
                .unwrap();
            // Closing early leaves the promised body unfinished
        });

        match fetcher().fetch_raw(&url, &RequestOptions::default()).await {
            FetchOutcome::Failed(failure) => {
                assert_eq!(failure.status, 200);
                assert!(!failure.is_transport());
                assert!(failure.headers.starts_with("HTTP/1.1 200"));
                assert_eq!(etag_from_header(&failure.headers).as_deref(), Some("\"cut\""));
                assert!(failure.body.is_empty());
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_sets_feed_url_to_final_target() {
        let server = MockServer::start().await;
        let new_url = format!("{}/new", server.uri());
        serve(
            &server,
            "/old",
            ResponseTemplate::new(301).insert_header("Location", new_url.as_str()),
        )
        .await;
        serve(
            &server,
            "/new",
            ResponseTemplate::new(200).set_body_string(VALID_RSS),
        )
        .await;

        let old_url = format!("{}/old", server.uri());
        let raw = fetcher()
            .fetch_raw(&old_url, &RequestOptions::default())
            .await
            .fetched()
            .unwrap();
        assert_eq!(raw.url, old_url);
        assert_eq!(raw.final_url, new_url);

        let feed = fetcher()
            .fetch_and_parse(&old_url, &RequestOptions::default())
            .await
            .unwrap()
            .fetched()
            .unwrap();
        assert_eq!(feed.feed_url.as_deref(), Some(new_url.as_str()));
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let server = MockServer::start().await;
        let looping = format!("{}/loop", server.uri());
        serve(
            &server,
            "/loop",
            ResponseTemplate::new(302).insert_header("Location", looping.as_str()),
        )
        .await;

        let outcome = fetcher()
            .fetch_raw(&looping, &RequestOptions::default())
            .await;
        assert_eq!(outcome.status(), 0);
    }

    #[tokio::test]
    async fn test_unrecognised_body_is_no_parser_available() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            ResponseTemplate::new(200).set_body_string("I'm an invalid feed"),
        )
        .await;

        let result = fetcher()
            .fetch_and_parse(&format!("{}/feed", server.uri()), &RequestOptions::default())
            .await;
        assert!(matches!(result, Err(FeedError::NoParserAvailable)));
    }

    #[tokio::test]
    async fn test_html_page_advertising_a_feed_is_followed() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/blog",
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><head>
                    <link rel="alternate" type="application/rss+xml" href="/feed.xml">
                    </head><body>Hello</body></html>"#,
                )
                .insert_header("Content-Type", "text/html"),
        )
        .await;
        serve(
            &server,
            "/feed.xml",
            ResponseTemplate::new(200).set_body_string(VALID_RSS),
        )
        .await;

        let feed = fetcher()
            .fetch_and_parse(&format!("{}/blog", server.uri()), &RequestOptions::default())
            .await
            .unwrap()
            .fetched()
            .unwrap();

        assert_eq!(feed.title.as_deref(), Some("Test Feed"));
        assert_eq!(
            feed.feed_url,
            Some(format!("{}/feed.xml", server.uri()))
        );
    }

    #[tokio::test]
    async fn test_batch_of_one_is_still_a_map() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            ResponseTemplate::new(200).set_body_string(VALID_RSS),
        )
        .await;

        let url = format!("{}/feed", server.uri());
        let results = fetcher()
            .fetch_and_parse_all([url.clone()], &RequestOptions::default())
            .await;

        assert_eq!(results.len(), 1);
        assert!(matches!(results.get(&url), Some(Ok(FetchOutcome::Fetched(_)))));
    }

    #[tokio::test]
    async fn test_batch_keys_every_requested_url() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/a",
            ResponseTemplate::new(200).set_body_string(VALID_RSS),
        )
        .await;
        serve(&server, "/b", ResponseTemplate::new(500)).await;
        serve(
            &server,
            "/c",
            ResponseTemplate::new(200).set_body_string("not a feed"),
        )
        .await;

        let urls: Vec<String> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| format!("{}{}", server.uri(), p))
            .collect();
        let mut with_refused = urls.clone();
        with_refused.push(unused_url());

        let fetcher = Fetcher::new(FetchOptions {
            max_in_flight: 2,
            ..Default::default()
        })
        .unwrap();
        let results = fetcher
            .fetch_and_parse_all(with_refused.clone(), &RequestOptions::default())
            .await;

        assert_eq!(results.len(), 4);
        assert!(matches!(results[&urls[0]], Ok(FetchOutcome::Fetched(_))));
        assert!(matches!(
            &results[&urls[1]],
            Ok(FetchOutcome::Failed(FetchFailure { status: 500, .. }))
        ));
        assert!(matches!(results[&urls[2]], Err(FeedError::NoParserAvailable)));
        assert!(matches!(
            &results[&with_refused[3]],
            Ok(FetchOutcome::Failed(FetchFailure { status: 0, .. }))
        ));
    }

    #[tokio::test]
    async fn test_raw_stream_yields_each_distinct_url_once() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/feed",
            ResponseTemplate::new(200).set_body_string(VALID_RSS),
        )
        .await;

        let url = format!("{}/feed", server.uri());
        let options = RequestOptions::default();
        let fetcher = fetcher();
        let outcomes: Vec<_> = fetcher
            .fetch_raw_stream(vec![url.clone(), url.clone()], &options)
            .collect()
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, url);
        assert_eq!(outcomes[0].1.status(), 200);
    }

    #[test]
    fn test_fetch_options_from_config() {
        let config = Config {
            user_agent: Some("ua".into()),
            max_in_flight: 0,
            ..Default::default()
        };
        let options = FetchOptions::from(&config);
        assert_eq!(options.user_agent, "ua");
        assert_eq!(options.max_in_flight, 1);
        assert_eq!(FetchOptions::default().user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_conditional_options_follow_feed() {
        let feed = Feed {
            etag: Some("\"x\"".into()),
            last_modified: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let options = RequestOptions::conditional_for(&feed);
        assert_eq!(options.if_none_match.as_deref(), Some("\"x\""));
        assert_eq!(options.if_modified_since, feed.last_modified);
    }
}
