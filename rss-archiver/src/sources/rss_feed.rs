use crate::fetcher::Fetcher;
use crate::parser::FeedParser;
use crate::traits::FeedClient;
use crate::types::{Condition, FetchResult, Result};
use async_trait::async_trait;
use tracing::{debug, info};

/// `FeedClient` over HTTP: conditional requests through `Fetcher`,
/// bodies through `FeedParser`.
#[derive(Clone)]
pub struct RssFeedSource {
    fetcher: Fetcher,
}

impl RssFeedSource {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl FeedClient for RssFeedSource {
    async fn fetch_with(&self, source_url: &str, condition: &Condition) -> Result<FetchResult> {
        let response = self.fetcher.fetch_feed(source_url, condition).await?;

        if response.not_modified {
            debug!("{} not modified since last fetch", source_url);
            return Ok(FetchResult::not_modified(
                response.status,
                response.etag,
                response.last_modified,
                response.date,
            ));
        }

        let parsed = FeedParser::parse_feed(&response.body, source_url, response.content_type.as_deref())?;
        info!("Pulled {} entries from {}", parsed.entries.len(), source_url);

        Ok(FetchResult {
            entries: parsed.entries,
            http_status: Some(response.status),
            not_modified: false,
            feed_updated: parsed.updated,
            feed_published: parsed.published,
            last_modified: response.last_modified,
            etag: response.etag,
            updated: response.date,
            bozo: parsed.bozo,
        })
    }
}
