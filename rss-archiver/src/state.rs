use crate::types::{ArchiverError, FreshnessCursor, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Feed name to cursor. Owned by the poll loop and replaced wholesale on
/// every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorSet(BTreeMap<String, FreshnessCursor>);

impl CursorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feed_name: &str) -> Option<&FreshnessCursor> {
        self.0.get(feed_name)
    }

    pub fn contains(&self, feed_name: &str) -> bool {
        self.0.contains_key(feed_name)
    }

    /// Returns the set with `cursor` stored under `feed_name`.
    pub fn with_cursor(mut self, feed_name: impl Into<String>, cursor: FreshnessCursor) -> Self {
        self.0.insert(feed_name.into(), cursor);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FreshnessCursor)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FreshnessCursor)> for CursorSet {
    fn from_iter<I: IntoIterator<Item = (String, FreshnessCursor)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Durable home of the cursor set.
#[derive(Debug, Clone)]
pub struct TrackerStore {
    path: PathBuf,
}

impl TrackerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no tracker has been written yet. A tracker that exists
    /// but cannot be read back is an error, never an empty set.
    pub async fn load(&self) -> Result<Option<CursorSet>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No tracker at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(ArchiverError::Io(e)),
        };

        let cursors: CursorSet = serde_json::from_slice(&bytes)?;
        info!("Loaded {} cursors from {}", cursors.len(), self.path.display());
        Ok(Some(cursors))
    }

    /// Writes the whole set through a temp file and a rename, so readers
    /// never observe a partial tracker.
    pub async fn save(&self, cursors: &CursorSet) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(cursors)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Saved {} cursors to {}", cursors.len(), self.path.display());
        Ok(())
    }

    /// Recovery tool: rewrites every cursor's `last_modified` to `token` and
    /// writes the result to `dest`, leaving this tracker untouched. Returns
    /// the number of cursors rewritten.
    pub async fn rewrite_last_modified(&self, token: &str, dest: impl Into<PathBuf>) -> Result<usize> {
        let cursors = self.load().await?.ok_or_else(|| {
            ArchiverError::Config(format!("no tracker found at {}", self.path.display()))
        })?;

        let rewritten: CursorSet = cursors
            .iter()
            .map(|(name, cursor)| {
                info!("{}: last_modified {:?} -> {:?}", name, cursor.last_modified, token);
                let mut cursor = cursor.clone();
                cursor.last_modified = Some(token.to_string());
                (name.clone(), cursor)
            })
            .collect();

        let count = rewritten.len();
        TrackerStore::new(dest).save(&rewritten).await?;
        Ok(count)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
