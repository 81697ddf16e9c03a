use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rss_archiver::logging::configure_logging;
use rss_archiver::{ArchiverConfig, FeedPoller, FeedPreset, FreshnessStrategy, PersistPolicy, TrackerStore};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rss-archiver", about = "Polls RSS feeds, archives new entries and downloads their articles")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Preconfigured feed set to download
    #[arg(long, value_enum, default_value_t = FeedChoice::St, global = true)]
    feed: FeedChoice,

    /// JSON config file; replaces the preset
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tracker file holding the per-feed cursors
    #[arg(long, global = true)]
    tracker: Option<PathBuf>,

    /// Directory for log files
    #[arg(long, default_value = ".", global = true)]
    log_dir: PathBuf,

    /// Root directory for archives and articles
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Seconds to wait between rounds
    #[arg(long)]
    interval: Option<u64>,

    /// Seconds to wait between article downloads
    #[arg(long)]
    partial_sleep: Option<f64>,

    /// Conditional-fetch token used for feeds without their own
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// When the tracker is written back
    #[arg(long, value_enum)]
    persist: Option<PersistArg>,

    /// Feeds polled at the same time within a round
    #[arg(long)]
    concurrency: Option<usize>,

    /// Bootstrap, run a single round and exit
    #[arg(long)]
    once: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a copy of the tracker with every last-modified token replaced
    ResetTracker {
        /// Replacement token, e.g. "Tue, 05 Apr 2022 14:00:00 GMT"
        #[arg(long)]
        last_modified: String,

        /// Destination file (defaults to the tracker path with ".new" appended)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FeedChoice {
    St,
    Cna,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    LastModified,
    Etag,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PersistArg {
    EveryUpdate,
    BootstrapOnly,
}

impl Cli {
    /// Where the feed list comes from; a config file replaces the preset.
    fn feed_source(&self) -> String {
        match &self.config {
            Some(path) => format!("config {}", path.display()),
            None => format!("preset {:?}", self.feed),
        }
    }

    fn build_config(&self) -> anyhow::Result<ArchiverConfig> {
        let mut config = match &self.config {
            Some(path) => ArchiverConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ArchiverConfig::preset(match self.feed {
                FeedChoice::St => FeedPreset::St,
                FeedChoice::Cna => FeedPreset::Cna,
            }),
        };

        if let Some(path) = &self.tracker {
            config.tracker_path = path.clone();
        }
        if let Some(path) = &self.data_root {
            config.data_root = path.clone();
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(partial_sleep) = self.partial_sleep {
            config.partial_sleep_secs = partial_sleep;
        }
        if let Some(strategy) = self.strategy {
            config.default_strategy = Some(match strategy {
                StrategyArg::LastModified => FreshnessStrategy::LastModified,
                StrategyArg::Etag => FreshnessStrategy::Etag,
            });
        }
        if let Some(persist) = self.persist {
            config.persist_policy = match persist {
                PersistArg::EveryUpdate => PersistPolicy::EveryUpdate,
                PersistArg::BootstrapOnly => PersistPolicy::BootstrapOnly,
            };
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = configure_logging(&cli.log_dir, "feed").context("failed to set up logging")?;

    info!("Program started");
    info!("Feeds from {}", cli.feed_source());

    let config = cli.build_config()?;

    match &cli.command {
        Some(Command::ResetTracker { last_modified, output }) => {
            let store = TrackerStore::new(config.tracker_path.clone());
            let output = output.clone().unwrap_or_else(|| {
                let mut name = config.tracker_path.clone().into_os_string();
                name.push(".new");
                PathBuf::from(name)
            });
            let count = store
                .rewrite_last_modified(last_modified, &output)
                .await
                .context("failed to rewrite tracker")?;
            info!("Rewrote {} cursors into {}", count, output.display());
        }
        None => {
            info!(
                "Tracking {} feeds into {} (tracker {})",
                config.feeds.len(),
                config.data_root.display(),
                config.tracker_path.display()
            );
            let mut poller = FeedPoller::from_config(config)?;

            if cli.once {
                poller.bootstrap().await.context("bootstrap failed")?;
                poller.run_round().await;
            } else {
                poller.run().await.context("bootstrap failed")?;
            }
        }
    }

    info!("Program completed");
    Ok(())
}
