//! Helpers shared by the feed and article side of the archiver

/// URL utilities for feeds and article links
pub mod url {
    use url::Url;

    /// Validate RSS feed URL format
    pub fn is_valid_rss_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            url.scheme() == "http" || url.scheme() == "https"
        } else {
            false
        }
    }

    /// The file stem an article is stored under: the last non-empty path
    /// segment of its link, or the host when the path is empty. Query and
    /// fragment never contribute. Returns `None` for links that do not parse.
    pub fn article_basename(link: &str) -> Option<String> {
        let url = Url::parse(link.trim()).ok()?;

        let segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(|s| s.to_string()));

        let raw = match segment {
            Some(segment) => segment,
            None => url.host_str()?.to_string(),
        };

        let name = sanitize_file_name(&raw);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    fn sanitize_file_name(raw: &str) -> String {
        let name: String = raw
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();

        // "." and ".." would escape the feed directory
        if name.chars().all(|c| c == '.') {
            name.replace('.', "_")
        } else {
            name
        }
    }
}

/// Time utilities for polling
pub mod time {
    use std::time::Duration;

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else if total_seconds < 86400 {
            format!("{}h", total_seconds / 3600)
        } else {
            format!("{}d", total_seconds / 86400)
        }
    }
}
