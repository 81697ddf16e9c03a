use crate::types::{ArchiverError, Condition, FetchConfig, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::header::{HeaderMap, CONTENT_TYPE, DATE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A feed response before parsing.
#[derive(Debug, Clone)]
pub struct RawFeedResponse {
    pub status: u16,
    pub not_modified: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub date: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// HTTP transport shared by feed polling and article downloads.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    /// Requests a feed under `condition`, retrying network faults and
    /// server errors with exponential backoff.
    pub async fn fetch_feed(&self, url: &str, condition: &Condition) -> Result<RawFeedResponse> {
        let start_time = Instant::now();
        debug!("Fetching feed: {} ({:?})", url, condition);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            match self.fetch_once(url, condition).await {
                Ok(response) => {
                    debug!(
                        "Feed {} answered {} in {}ms",
                        url,
                        response.status,
                        start_time.elapsed().as_millis()
                    );
                    return Ok(response);
                }
                Err(e) if attempt < self.config.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Attempt {} failed for {}: {}; retrying in {:?}", attempt, url, e, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str, condition: &Condition) -> Result<RawFeedResponse> {
        let mut request = self.client.get(url);
        match condition {
            Condition::Unconditional => {}
            Condition::IfModifiedSince(token) => request = request.header(IF_MODIFIED_SINCE, token),
            Condition::IfNoneMatch(token) => request = request.header(IF_NONE_MATCH, token),
        }

        let response = self.bounded(url, request.send()).await?;
        let status = response.status();
        let headers = response.headers().clone();

        if status == StatusCode::NOT_MODIFIED {
            debug!("Feed not modified: {}", url);
            return Ok(RawFeedResponse {
                status: status.as_u16(),
                not_modified: true,
                etag: header_string(&headers, ETAG),
                last_modified: header_string(&headers, LAST_MODIFIED),
                date: header_string(&headers, DATE),
                content_type: header_string(&headers, CONTENT_TYPE),
                body: Vec::new(),
            });
        }

        if !status.is_success() {
            return Err(ArchiverError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(content_length) = response.content_length() {
            self.check_feed_size(content_length)?;
        }

        // chunked and compressed bodies carry no usable length up front
        let body = self.bounded(url, response.bytes()).await?;
        self.check_feed_size(body.len() as u64)?;
        info!("Fetched feed: {} ({} bytes)", url, body.len());

        Ok(RawFeedResponse {
            status: status.as_u16(),
            not_modified: false,
            etag: header_string(&headers, ETAG),
            last_modified: header_string(&headers, LAST_MODIFIED),
            date: header_string(&headers, DATE),
            content_type: header_string(&headers, CONTENT_TYPE),
            body: body.to_vec(),
        })
    }

    /// Downloads a document in a single attempt.
    pub async fn fetch_document(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching document: {}", url);

        let response = self.bounded(url, self.client.get(url).send()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiverError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = self.bounded(url, response.bytes()).await?;
        Ok(body.to_vec())
    }

    fn check_feed_size(&self, bytes: u64) -> Result<()> {
        let size_mb = (bytes / (1024 * 1024)) as usize;
        if size_mb > self.config.max_feed_size_mb {
            return Err(ArchiverError::FeedTooLarge { size_mb });
        }
        Ok(())
    }

    /// Runs a request future under the configured timeout.
    async fn bounded<T, F>(&self, url: &str, request: F) -> Result<T>
    where
        F: Future<Output = reqwest::Result<T>>,
    {
        let seconds = self.config.timeout_seconds;
        match tokio::time::timeout(Duration::from_secs(seconds), request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_timeout() => Err(ArchiverError::Timeout {
                url: url.to_string(),
                seconds,
            }),
            Ok(Err(e)) => Err(ArchiverError::Http(e)),
            Err(_) => Err(ArchiverError::Timeout {
                url: url.to_string(),
                seconds,
            }),
        }
    }
}

fn is_retryable(error: &ArchiverError) -> bool {
    match error {
        ArchiverError::Http(_) | ArchiverError::Timeout { .. } => true,
        ArchiverError::Status { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
