use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which conditional-fetch token a feed is tracked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStrategy {
    LastModified,
    Etag,
}

impl std::fmt::Display for FreshnessStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FreshnessStrategy::LastModified => write!(f, "last_modified"),
            FreshnessStrategy::Etag => write!(f, "etag"),
        }
    }
}

/// Per-feed conditional-fetch state, keyed by feed name in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessCursor {
    pub source_url: String,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub feed_updated: Option<DateTime<Utc>>,
    pub feed_published: Option<DateTime<Utc>>,
    pub last_seen_feed_updated: Option<String>,
}

impl FreshnessCursor {
    /// A cursor with no tokens; the next fetch for it is unconditional.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            last_modified: None,
            etag: None,
            feed_updated: None,
            feed_published: None,
            last_seen_feed_updated: None,
        }
    }

    /// Builds the cursor for `source_url` from everything `result` reported.
    pub fn from_fetch(source_url: impl Into<String>, result: &FetchResult) -> Self {
        Self {
            source_url: source_url.into(),
            last_modified: result.last_modified.clone(),
            etag: result.etag.clone(),
            feed_updated: result.feed_updated,
            feed_published: result.feed_published,
            last_seen_feed_updated: result.updated.clone(),
        }
    }

    /// The cursor that follows this one once `result` has been archived.
    /// `source_url` never changes; every other field is replaced wholesale.
    pub fn advanced(&self, result: &FetchResult) -> Self {
        Self::from_fetch(self.source_url.clone(), result)
    }

    pub fn token_for(&self, strategy: FreshnessStrategy) -> Option<&str> {
        match strategy {
            FreshnessStrategy::LastModified => self.last_modified.as_deref(),
            FreshnessStrategy::Etag => self.etag.as_deref(),
        }
    }
}

/// The precondition attached to a feed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Unconditional,
    IfModifiedSince(String),
    IfNoneMatch(String),
}

impl Condition {
    /// Picks the request precondition for a feed. Without a strategy, or
    /// without a stored token for it, the fetch is unconditional.
    pub fn select(strategy: Option<FreshnessStrategy>, cursor: &FreshnessCursor) -> Self {
        match strategy {
            Some(FreshnessStrategy::LastModified) => match cursor.token_for(FreshnessStrategy::LastModified) {
                Some(token) => Condition::IfModifiedSince(token.to_string()),
                None => Condition::Unconditional,
            },
            Some(FreshnessStrategy::Etag) => match cursor.token_for(FreshnessStrategy::Etag) {
                Some(token) => Condition::IfNoneMatch(token.to_string()),
                None => Condition::Unconditional,
            },
            None => Condition::Unconditional,
        }
    }
}

/// A text construct together with how it was declared in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDetail {
    #[serde(rename = "type")]
    pub content_type: String,
    pub language: Option<String>,
    pub base: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLink {
    pub rel: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub href: String,
}

/// One article reference produced by a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: String,
    pub title: Option<String>,
    pub title_detail: Option<TextDetail>,
    pub links: Vec<EntryLink>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub summary_detail: Option<TextDetail>,
    pub published: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

impl FeedEntry {
    pub fn guid_is_link(&self) -> bool {
        self.link.as_deref() == Some(self.id.as_str())
    }
}

/// Everything a single feed request reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub entries: Vec<FeedEntry>,
    pub http_status: Option<u16>,
    pub not_modified: bool,
    pub feed_updated: Option<DateTime<Utc>>,
    pub feed_published: Option<DateTime<Utc>>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    /// HTTP `Date` of the response.
    pub updated: Option<String>,
    /// Set when the feed looked malformed but still parsed.
    pub bozo: Option<String>,
}

impl FetchResult {
    pub fn not_modified(status: u16, etag: Option<String>, last_modified: Option<String>, updated: Option<String>) -> Self {
        Self {
            http_status: Some(status),
            not_modified: true,
            etag,
            last_modified,
            updated,
            ..Default::default()
        }
    }

    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/6.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Link has no usable document name: {0}")]
    UnusableLink(String),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Content from {url} is not valid UTF-8: {source}")]
    Decode {
        url: String,
        source: std::str::Utf8Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Data root {path} is unavailable: {source}")]
    DataRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ArchiverError {
    /// Network and content faults that only cost the current feed or entry
    /// its turn. Everything else touches local storage.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ArchiverError::Http(_)
                | ArchiverError::Timeout { .. }
                | ArchiverError::Status { .. }
                | ArchiverError::Parse(_)
                | ArchiverError::InvalidUrl(_)
                | ArchiverError::UnusableLink(_)
                | ArchiverError::FeedTooLarge { .. }
                | ArchiverError::Decode { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ArchiverError>;
