use crate::fetcher::Fetcher;
use crate::rss_utils::url::article_basename;
use crate::types::{ArchiverError, FeedEntry, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

/// Outcome of downloading the articles of one batch of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub stored: Vec<PathBuf>,
    pub failed: Vec<String>,
}

/// Stores the raw HTML behind entry links, one attempt per entry.
#[derive(Clone)]
pub struct ArticleFetcher {
    fetcher: Fetcher,
    partial_sleep: Option<Duration>,
}

impl ArticleFetcher {
    pub fn new(fetcher: Fetcher, partial_sleep: Option<Duration>) -> Self {
        Self {
            fetcher,
            partial_sleep,
        }
    }

    /// Where the document for `link` lives inside `feed_dir`.
    pub fn document_path(feed_dir: &Path, link: &str) -> Result<PathBuf> {
        let basename = article_basename(link).ok_or_else(|| ArchiverError::UnusableLink(link.to_string()))?;
        Ok(feed_dir.join(format!("{}.html", basename)))
    }

    /// Downloads one article into `feed_dir`. The body must be UTF-8.
    pub async fn download(&self, feed_dir: &Path, link: &str) -> Result<PathBuf> {
        let path = Self::document_path(feed_dir, link)?;
        debug!("Storing {} as {}", link, path.display());

        let body = self.fetcher.fetch_document(link).await?;
        let text = std::str::from_utf8(&body).map_err(|source| ArchiverError::Decode {
            url: link.to_string(),
            source,
        })?;

        tokio::fs::write(&path, text).await?;
        info!("Stored article {}", path.display());
        Ok(path)
    }

    /// Attempts every linked entry in order. A failed entry is logged with
    /// its URL and skipped; it never stops the ones after it.
    pub async fn download_all(&self, feed_dir: &Path, entries: &[FeedEntry]) -> DownloadReport {
        let mut report = DownloadReport::default();

        for entry in entries {
            let Some(link) = entry.link.as_deref() else {
                debug!("Entry {} has no link, no article to fetch", entry.id);
                continue;
            };
            match self.download(feed_dir, link).await {
                Ok(path) => report.stored.push(path),
                Err(e) => {
                    error!(url = %link, error = %e, "Failed to retrieve article");
                    report.failed.push(link.to_string());
                }
            }

            if let Some(delay) = self.partial_sleep {
                tokio::time::sleep(delay).await;
            }
        }

        report
    }
}
