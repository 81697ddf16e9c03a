use crate::types::{ArchiverError, EntryLink, FeedEntry, Result, TextDetail};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use tracing::debug;

/// A parsed feed body, reduced to what the archiver keeps.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub entries: Vec<FeedEntry>,
    pub updated: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
    pub bozo: Option<String>,
}

pub struct FeedParser;

impl FeedParser {
    /// Parses a feed body. Soft problems are reported through `bozo`;
    /// only a body that cannot be read as a feed at all is an error.
    pub fn parse_feed(content: &[u8], feed_url: &str, content_type: Option<&str>) -> Result<ParsedFeed> {
        debug!("Parsing feed content from {} ({} bytes)", feed_url, content.len());

        let feed = parser::parse(content)
            .map_err(|e| ArchiverError::Parse(format!("Failed to parse feed {}: {}", feed_url, e)))?;

        let language = feed.language.clone();
        let entries: Vec<FeedEntry> = feed
            .entries
            .into_iter()
            .map(|entry| Self::convert_entry(entry, feed_url, language.as_deref()))
            .collect();

        let mut problems = Vec::new();
        if let Some(content_type) = content_type {
            if !Self::is_feed_content_type(content_type) {
                problems.push(format!("unexpected content type {}", content_type));
            }
        }
        let missing_links = entries.iter().filter(|e| e.link.is_none()).count();
        if missing_links > 0 {
            problems.push(format!("{} entries without a link", missing_links));
        }

        debug!("Parsed feed {} with {} entries", feed_url, entries.len());

        Ok(ParsedFeed {
            entries,
            updated: feed.updated,
            published: feed.published,
            bozo: if problems.is_empty() { None } else { Some(problems.join("; ")) },
        })
    }

    fn convert_entry(entry: feed_rs::model::Entry, feed_url: &str, language: Option<&str>) -> FeedEntry {
        let links: Vec<EntryLink> = entry
            .links
            .iter()
            .filter(|l| !l.href.trim().is_empty())
            .map(|l| EntryLink {
                rel: l.rel.clone(),
                content_type: l.media_type.clone(),
                href: l.href.clone(),
            })
            .collect();
        let link = links.first().map(|l| l.href.clone());

        let title_detail = entry
            .title
            .as_ref()
            .map(|t| Self::text_detail(t.content_type.essence_str(), &t.content, feed_url, language));

        // RSS description, else the Atom content body
        let summary_detail = match (&entry.summary, &entry.content) {
            (Some(summary), _) => Some(Self::text_detail(
                summary.content_type.essence_str(),
                &summary.content,
                feed_url,
                language,
            )),
            (None, Some(content)) => content
                .body
                .as_ref()
                .map(|body| Self::text_detail(content.content_type.essence_str(), body, feed_url, language)),
            (None, None) => None,
        };

        FeedEntry {
            id: entry.id,
            title: title_detail.as_ref().map(|d| d.value.clone()),
            title_detail,
            links,
            link,
            summary: summary_detail.as_ref().map(|d| d.value.clone()),
            summary_detail,
            published: entry.published,
            source: entry.source,
        }
    }

    fn text_detail(content_type: &str, value: &str, base: &str, language: Option<&str>) -> TextDetail {
        TextDetail {
            content_type: content_type.to_string(),
            language: language.map(|l| l.to_string()),
            base: Some(base.to_string()),
            value: value.to_string(),
        }
    }

    pub fn is_feed_content_type(content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        essence.ends_with("/xml")
            || essence.ends_with("+xml")
            || essence.ends_with("/json")
            || essence.ends_with("+json")
    }
}
