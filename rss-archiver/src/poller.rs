use crate::archiver::EntryArchiver;
use crate::articles::{ArticleFetcher, DownloadReport};
use crate::config::{is_safe_feed_name, ArchiverConfig, FeedSpec, PersistPolicy};
use crate::fetcher::Fetcher;
use crate::rss_utils::time::format_duration;
use crate::sources::RssFeedSource;
use crate::state::{CursorSet, TrackerStore};
use crate::traits::FeedClient;
use crate::types::{ArchiverError, Condition, FetchResult, FreshnessCursor, FreshnessStrategy, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one pass over the feeds did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub feeds_polled: usize,
    pub feeds_failed: usize,
    pub rows_appended: usize,
    pub articles_stored: usize,
    pub articles_failed: usize,
    pub tracker_saved: bool,
}

impl RoundReport {
    fn record(&mut self, outcome: &FeedOutcome) {
        self.feeds_polled += 1;
        if outcome.failed {
            self.feeds_failed += 1;
        }
        self.rows_appended += outcome.appended;
        self.articles_stored += outcome.articles.stored.len();
        self.articles_failed += outcome.articles.failed.len();
    }
}

#[derive(Debug, Default)]
struct FeedOutcome {
    name: String,
    advanced: Option<FreshnessCursor>,
    failed: bool,
    appended: usize,
    articles: DownloadReport,
}

impl FeedOutcome {
    fn failed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failed: true,
            ..Default::default()
        }
    }
}

/// Drives fetch, append, download and sleep over every tracked feed.
pub struct FeedPoller {
    config: ArchiverConfig,
    client: Arc<dyn FeedClient>,
    archiver: EntryArchiver,
    articles: ArticleFetcher,
    tracker: TrackerStore,
    cursors: CursorSet,
    // cursors moved since the tracker was last written
    dirty: bool,
}

impl FeedPoller {
    pub fn new(config: ArchiverConfig, client: Arc<dyn FeedClient>, articles: ArticleFetcher) -> Self {
        let archiver = EntryArchiver::new(config.data_root.clone());
        let tracker = TrackerStore::new(config.tracker_path.clone());

        Self {
            config,
            client,
            archiver,
            articles,
            tracker,
            cursors: CursorSet::new(),
            dirty: false,
        }
    }

    /// Wires the HTTP feed source and article fetcher from `config`.
    pub fn from_config(config: ArchiverConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = Fetcher::new(config.fetch.clone())?;
        let client: Arc<dyn FeedClient> = Arc::new(RssFeedSource::new(fetcher.clone()));
        let articles = ArticleFetcher::new(fetcher, config.partial_sleep());
        Ok(Self::new(config, client, articles))
    }

    pub fn cursors(&self) -> &CursorSet {
        &self.cursors
    }

    pub fn archiver(&self) -> &EntryArchiver {
        &self.archiver
    }

    /// Establishes the starting cursor set. A saved tracker is taken as is
    /// once every feed name in it is a safe directory name;
    /// configured feeds it does not know yet, or every feed when there is no
    /// tracker, get one unconditional fetch, a fresh header-only archive and
    /// a cursor, and the tracker is written before anything is archived.
    /// Errors from here are fatal.
    pub async fn bootstrap(&mut self) -> Result<RoundReport> {
        tokio::fs::create_dir_all(&self.config.data_root)
            .await
            .map_err(|source| ArchiverError::DataRoot {
                path: self.config.data_root.clone(),
                source,
            })?;

        let pending: Vec<FeedSpec> = match self.tracker.load().await? {
            Some(cursors) => {
                info!("Initializing from previous tracker {}", self.tracker.path().display());
                if let Some((name, _)) = cursors.iter().find(|(name, _)| !is_safe_feed_name(name)) {
                    return Err(ArchiverError::Config(format!(
                        "tracker {} holds feed name {:?} that cannot be used as a directory name",
                        self.tracker.path().display(),
                        name
                    )));
                }
                for feed in &self.config.feeds {
                    if let Some(cursor) = cursors.get(&feed.name) {
                        if cursor.source_url != feed.url {
                            warn!(
                                "{} is tracked at {}, ignoring configured url {}",
                                feed.name, cursor.source_url, feed.url
                            );
                        }
                    }
                }
                let missing = self
                    .config
                    .feeds
                    .iter()
                    .filter(|feed| !cursors.contains(&feed.name))
                    .cloned()
                    .collect();
                self.cursors = cursors;
                missing
            }
            None => {
                info!("No tracker found, initializing feeds");
                self.config.feeds.clone()
            }
        };

        let mut report = RoundReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let mut fetched = Vec::with_capacity(pending.len());
        for feed in &pending {
            let result = match self.client.fetch_with(&feed.url, &Condition::Unconditional).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(feed = %feed.name, error = %e, "Initial fetch failed, starting without tokens");
                    None
                }
            };
            let cursor = match &result {
                Some(result) => FreshnessCursor::from_fetch(feed.url.clone(), result),
                None => FreshnessCursor::new(feed.url.clone()),
            };
            self.cursors = std::mem::take(&mut self.cursors).with_cursor(feed.name.clone(), cursor);
            fetched.push((feed, result));
        }
        info!("Retrieved {} feeds", fetched.len());

        self.tracker.save(&self.cursors).await?;
        self.dirty = false;

        for (feed, result) in fetched {
            self.archiver.init_feed(&feed.name).await?;

            let outcome = match result {
                Some(result) => {
                    let cursor = self
                        .cursors
                        .get(&feed.name)
                        .cloned()
                        .unwrap_or_else(|| FreshnessCursor::new(feed.url.clone()));
                    self.process_result(&feed.name, &cursor, result).await
                }
                None => FeedOutcome::failed(&feed.name),
            };
            report.record(&outcome);
            self.apply(outcome);
        }

        report.tracker_saved = self.persist_if_due().await;
        info!("Bootstrap complete: {:?}", report);
        Ok(report)
    }

    /// One pass over every tracked feed: conditional fetch, append, article
    /// downloads. Feeds run on up to `concurrency` workers and never see
    /// each other's failures; the cursor set is updated once all are done.
    pub async fn run_round(&mut self) -> RoundReport {
        let tasks: Vec<(String, FreshnessCursor, Option<FreshnessStrategy>)> = self
            .cursors
            .iter()
            .map(|(name, cursor)| (name.clone(), cursor.clone(), self.config.strategy_for(name)))
            .collect();

        let outcomes: Vec<FeedOutcome> = {
            let this = &*self;
            stream::iter(tasks)
                .map(|(name, cursor, strategy)| async move { this.poll_feed(name, cursor, strategy).await })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await
        };

        let mut report = RoundReport::default();
        for outcome in outcomes {
            report.record(&outcome);
            self.apply(outcome);
        }

        report.tracker_saved = self.persist_if_due().await;
        info!(
            "Round complete: {} feeds, {} failed, {} new rows, {} articles stored, {} articles failed",
            report.feeds_polled,
            report.feeds_failed,
            report.rows_appended,
            report.articles_stored,
            report.articles_failed
        );
        report
    }

    /// Bootstraps, then polls forever with a fixed pause between rounds.
    pub async fn run(mut self) -> Result<()> {
        self.bootstrap().await?;

        let interval = self.config.poll_interval();
        loop {
            info!("Get feed update");
            self.run_round().await;
            info!("Waiting {} before checking again", format_duration(interval));
            tokio::time::sleep(interval).await;
        }
    }

    async fn poll_feed(&self, name: String, cursor: FreshnessCursor, strategy: Option<FreshnessStrategy>) -> FeedOutcome {
        match self.client.fetch(&cursor, strategy).await {
            Ok(result) => self.process_result(&name, &cursor, result).await,
            Err(e) => {
                warn!(feed = %name, url = %cursor.source_url, error = %e, "Failed to fetch feed");
                FeedOutcome::failed(&name)
            }
        }
    }

    async fn process_result(&self, name: &str, cursor: &FreshnessCursor, result: FetchResult) -> FeedOutcome {
        if let Some(reason) = &result.bozo {
            warn!(feed = %name, "Malformed feed ({}), processing entries best-effort", reason);
        }

        if !result.has_entries() {
            info!("{} has 0 new entries", name);
            return FeedOutcome {
                name: name.to_string(),
                ..Default::default()
            };
        }

        let advanced = match self.archiver.diff_and_append(name, &result, cursor).await {
            Ok(advanced) => advanced,
            Err(e) => {
                if e.is_transient() {
                    warn!(feed = %name, error = %e, "Failed to archive entries");
                } else {
                    error!(feed = %name, error = %e, "Failed to archive entries");
                }
                return FeedOutcome::failed(name);
            }
        };

        let feed_dir = self.archiver.feed_dir(name);
        let articles = self.articles.download_all(&feed_dir, &result.entries).await;

        FeedOutcome {
            name: name.to_string(),
            advanced,
            failed: false,
            appended: result.entries.len(),
            articles,
        }
    }

    fn apply(&mut self, outcome: FeedOutcome) {
        if let Some(cursor) = outcome.advanced {
            debug!("Advancing cursor for {}", outcome.name);
            self.cursors = std::mem::take(&mut self.cursors).with_cursor(outcome.name, cursor);
            self.dirty = true;
        }
    }

    /// Writes the tracker when cursors moved and the policy asks for it. A
    /// failed write is logged and tried again after the next round.
    async fn persist_if_due(&mut self) -> bool {
        if !self.dirty || self.config.persist_policy == PersistPolicy::BootstrapOnly {
            return false;
        }

        match self.tracker.save(&self.cursors).await {
            Ok(()) => {
                self.dirty = false;
                true
            }
            Err(e) => {
                error!(path = %self.tracker.path().display(), error = %e, "Failed to save tracker, will retry next round");
                false
            }
        }
    }
}
