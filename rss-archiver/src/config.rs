use crate::rss_utils::url::is_valid_rss_url;
use crate::types::{ArchiverError, FetchConfig, FreshnessStrategy, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One configured feed. `name` doubles as the archive subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub strategy: Option<FreshnessStrategy>,
}

impl FeedSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, strategy: FreshnessStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// When the tracker is written back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Save after every round that advanced at least one cursor.
    #[default]
    EveryUpdate,
    /// Save only while bootstrapping; later cursor moves live in memory.
    BootstrapOnly,
}

/// Preconfigured feed-URL sets selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPreset {
    St,
    Cna,
}

const ST_FEEDS: &[(&str, &str)] = &[
    ("breaking_news", "https://www.straitstimes.com/rss_breaking_news.opml"),
    ("world", "https://www.straitstimes.com/news/world/rss.xml"),
    ("business", "https://www.straitstimes.com/news/business/rss.xml"),
    ("sport", "https://www.straitstimes.com/news/sport/rss.xml"),
    ("life", "https://www.straitstimes.com/news/life/rss.xml"),
    ("opinion", "https://www.straitstimes.com/news/opinion/rss.xml"),
    ("singapore", "https://www.straitstimes.com/news/singapore/rss.xml"),
    ("asia", "https://www.straitstimes.com/news/asia/rss.xml"),
    ("tech", "https://www.straitstimes.com/news/tech/rss.xml"),
    ("multimedia", "https://www.straitstimes.com/news/multimedia/rss.xml"),
];

const CNA_FEEDS: &[(&str, &str)] = &[
    ("latest_news", "https://www.channelnewsasia.com/api/v1/rss-outbound-feed?_format=xml"),
    ("asia", "https://www.channelnewsasia.com/api/v1/rss-outbound-feed?_format=xml&category=6511"),
    ("business", "https://www.channelnewsasia.com/api/v1/rss-outbound-feed?_format=xml&category=6936"),
    ("singapore", "https://www.channelnewsasia.com/api/v1/rss-outbound-feed?_format=xml&category=10416"),
    ("sport", "https://www.channelnewsasia.com/api/v1/rss-outbound-feed?_format=xml&category=10296"),
    ("world", "https://www.channelnewsasia.com/api/v1/rss-outbound-feed?_format=xml&category=6311"),
];

impl FeedPreset {
    pub fn key(&self) -> &'static str {
        match self {
            FeedPreset::St => "st",
            FeedPreset::Cna => "cna",
        }
    }

    fn feeds(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            FeedPreset::St => ST_FEEDS,
            FeedPreset::Cna => CNA_FEEDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiverConfig {
    pub feeds: Vec<FeedSpec>,
    pub data_root: PathBuf,
    pub tracker_path: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub partial_sleep_secs: f64,
    #[serde(default = "default_strategy")]
    pub default_strategy: Option<FreshnessStrategy>,
    #[serde(default)]
    pub persist_policy: PersistPolicy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub fetch: FetchConfig,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_concurrency() -> usize {
    1
}

fn default_strategy() -> Option<FreshnessStrategy> {
    Some(FreshnessStrategy::LastModified)
}

impl ArchiverConfig {
    pub fn new(feeds: Vec<FeedSpec>, data_root: impl Into<PathBuf>, tracker_path: impl Into<PathBuf>) -> Self {
        Self {
            feeds,
            data_root: data_root.into(),
            tracker_path: tracker_path.into(),
            poll_interval_secs: default_poll_interval(),
            partial_sleep_secs: 0.0,
            default_strategy: default_strategy(),
            persist_policy: PersistPolicy::default(),
            concurrency: default_concurrency(),
            fetch: FetchConfig::default(),
        }
    }

    /// The built-in settings for a preset feed set. Both presets track
    /// feeds by last-modified; their servers do not send usable etags.
    pub fn preset(preset: FeedPreset) -> Self {
        let feeds = preset
            .feeds()
            .iter()
            .map(|(name, url)| FeedSpec::new(*name, *url))
            .collect();

        Self::new(
            feeds,
            Path::new("data").join(preset.key()),
            format!("{}_feed_tracker.json", preset.key()),
        )
    }

    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: ArchiverConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(ArchiverError::Config("no feeds configured".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ArchiverError::Config("concurrency must be at least 1".to_string()));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(ArchiverError::Config("fetch timeout must be at least 1 second".to_string()));
        }
        if !self.partial_sleep_secs.is_finite() || self.partial_sleep_secs < 0.0 {
            return Err(ArchiverError::Config(format!(
                "partial sleep must be a non-negative number of seconds, got {}",
                self.partial_sleep_secs
            )));
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if !is_safe_feed_name(&feed.name) {
                return Err(ArchiverError::Config(format!(
                    "feed name {:?} cannot be used as a directory name",
                    feed.name
                )));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(ArchiverError::Config(format!("duplicate feed name {:?}", feed.name)));
            }
            url::Url::parse(&feed.url)?;
            if !is_valid_rss_url(&feed.url) {
                return Err(ArchiverError::Config(format!("feed {} must use http or https", feed.name)));
            }
        }

        Ok(())
    }

    pub fn strategy_for(&self, feed_name: &str) -> Option<FreshnessStrategy> {
        self.feeds
            .iter()
            .find(|feed| feed.name == feed_name)
            .and_then(|feed| feed.strategy)
            .or(self.default_strategy)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn partial_sleep(&self) -> Option<Duration> {
        if self.partial_sleep_secs > 0.0 {
            Some(Duration::from_secs_f64(self.partial_sleep_secs))
        } else {
            None
        }
    }
}

/// Whether `name` can serve as a directory directly under the data root.
pub(crate) fn is_safe_feed_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
