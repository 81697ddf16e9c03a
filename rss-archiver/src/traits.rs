use crate::types::{Condition, FetchResult, FreshnessCursor, FreshnessStrategy, Result};
use async_trait::async_trait;

/// Fetches a feed, conditionally or not, and reports what came back.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Performs one request for `source_url` under `condition`.
    /// A "not modified" answer is an empty result, not an error.
    async fn fetch_with(&self, source_url: &str, condition: &Condition) -> Result<FetchResult>;

    /// Fetches the feed behind `cursor`, conditional on the token that
    /// `strategy` selects.
    async fn fetch(&self, cursor: &FreshnessCursor, strategy: Option<FreshnessStrategy>) -> Result<FetchResult> {
        let condition = Condition::select(strategy, cursor);
        self.fetch_with(&cursor.source_url, &condition).await
    }
}
