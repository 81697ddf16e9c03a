use crate::types::{ArchiverError, FeedEntry, FetchResult, FreshnessCursor, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const RECORDS_FILE: &str = "records.csv";

/// Column set fixed by the header row of every archive.
pub const ARCHIVE_COLUMNS: [&str; 11] = [
    "title",
    "title_detail",
    "links",
    "link",
    "summary",
    "summary_detail",
    "id",
    "guidislink",
    "published",
    "published_parsed",
    "source",
];

/// One archive row. Field order matches `ARCHIVE_COLUMNS`; entry fields
/// with no column here are not stored.
///
/// feed-rs hands over entry dates already parsed and drops the source text,
/// so `published` is the parsed instant re-rendered as RFC 2822 (always
/// `+0000`), not the string the feed carried. Atom dates come out in RFC
/// 2822 form too. `published_parsed` is the same instant in RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub title: String,
    pub title_detail: String,
    pub links: String,
    pub link: String,
    pub summary: String,
    pub summary_detail: String,
    pub id: String,
    pub guidislink: String,
    pub published: String,
    pub published_parsed: String,
    pub source: String,
}

impl ArchiveRecord {
    pub fn from_entry(entry: &FeedEntry) -> Result<Self> {
        Ok(Self {
            title: entry.title.clone().unwrap_or_default(),
            title_detail: json_cell(&entry.title_detail)?,
            links: if entry.links.is_empty() {
                String::new()
            } else {
                serde_json::to_string(&entry.links)?
            },
            link: entry.link.clone().unwrap_or_default(),
            summary: entry.summary.clone().unwrap_or_default(),
            summary_detail: json_cell(&entry.summary_detail)?,
            id: entry.id.clone(),
            guidislink: if entry.guid_is_link() { "True" } else { "False" }.to_string(),
            published: entry.published.map(|d| d.to_rfc2822()).unwrap_or_default(),
            published_parsed: entry.published.map(|d| d.to_rfc3339()).unwrap_or_default(),
            source: entry.source.clone().unwrap_or_default(),
        })
    }
}

fn json_cell<T: Serialize>(value: &Option<T>) -> Result<String> {
    match value {
        Some(v) => Ok(serde_json::to_string(v)?),
        None => Ok(String::new()),
    }
}

/// Append-only per-feed record logs under a data root.
#[derive(Debug, Clone)]
pub struct EntryArchiver {
    data_root: PathBuf,
}

impl EntryArchiver {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn feed_dir(&self, feed_name: &str) -> PathBuf {
        self.data_root.join(feed_name)
    }

    pub fn records_path(&self, feed_name: &str) -> PathBuf {
        self.feed_dir(feed_name).join(RECORDS_FILE)
    }

    /// Creates the feed's directory under the data root. Failing here means
    /// nothing can be stored at all.
    pub async fn ensure_feed_dir(&self, feed_name: &str) -> Result<PathBuf> {
        let dir = self.feed_dir(feed_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ArchiverError::DataRoot {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Starts the feed's archive over with a header-only file.
    pub async fn init_feed(&self, feed_name: &str) -> Result<PathBuf> {
        self.ensure_feed_dir(feed_name).await?;
        let path = self.records_path(feed_name);
        tokio::fs::write(&path, header_bytes()?).await?;
        info!("Initialized archive {}", path.display());
        Ok(path)
    }

    /// Appends every entry of `result` to the feed's archive. The entries are
    /// taken as new as they stand; nothing is compared against rows already
    /// archived. When at least one row was written, returns the cursor
    /// advanced to the tokens of this fetch.
    pub async fn diff_and_append(
        &self,
        feed_name: &str,
        result: &FetchResult,
        cursor: &FreshnessCursor,
    ) -> Result<Option<FreshnessCursor>> {
        if !result.has_entries() {
            debug!("{} has 0 new entries", feed_name);
            return Ok(None);
        }

        let path = self.records_path(feed_name);
        let mut bytes = Vec::new();
        if !path_exists(&path).await? {
            self.ensure_feed_dir(feed_name).await?;
            bytes.extend(header_bytes()?);
        }
        bytes.extend(rows_bytes(&result.entries)?);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&bytes).await?;
        file.flush().await?;

        info!("{} has {} new entries", feed_name, result.entries.len());
        Ok(Some(cursor.advanced(result)))
    }

    /// Reads back every row archived for a feed.
    pub async fn read_records(&self, feed_name: &str) -> Result<Vec<ArchiveRecord>> {
        let bytes = tokio::fs::read(self.records_path(feed_name)).await?;
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let records = reader
            .deserialize::<ArchiveRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn header_bytes() -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ARCHIVE_COLUMNS)?;
    into_bytes(writer)
}

fn rows_bytes(entries: &[FeedEntry]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for entry in entries {
        writer.serialize(ArchiveRecord::from_entry(entry)?)?;
    }
    into_bytes(writer)
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| ArchiverError::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
}

async fn path_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ArchiverError::Io(e)),
    }
}
