pub mod types;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod traits;
pub mod sources;
pub mod state;
pub mod archiver;
pub mod articles;
pub mod poller;
pub mod rss_utils;
pub mod logging;

pub use types::*;
pub use config::{ArchiverConfig, FeedPreset, FeedSpec, PersistPolicy};
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use traits::FeedClient;
pub use sources::RssFeedSource;
pub use state::{CursorSet, TrackerStore};
pub use archiver::{ArchiveRecord, EntryArchiver, ARCHIVE_COLUMNS};
pub use articles::{ArticleFetcher, DownloadReport};
pub use poller::{FeedPoller, RoundReport};
