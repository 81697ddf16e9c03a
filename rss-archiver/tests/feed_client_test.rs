use rss_archiver::{
    ArchiverError, Condition, FeedClient, FetchConfig, Fetcher, FreshnessCursor, FreshnessStrategy, RssFeedSource,
};
use std::sync::Once;
use tracing::info;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

const LAST_MODIFIED: &str = "Tue, 05 Apr 2022 14:00:00 GMT";

fn world_feed() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>World</title>
    <link>https://x/world</link>
    <description>World news</description>
    <lastBuildDate>Tue, 05 Apr 2022 14:00:00 GMT</lastBuildDate>
    <item>
      <title>A</title>
      <link>https://x/a</link>
      <description>First story</description>
      <guid>https://x/a</guid>
      <pubDate>Tue, 05 Apr 2022 13:00:00 GMT</pubDate>
    </item>
    <item>
      <title>B</title>
      <link>https://x/b</link>
      <description>Second story</description>
      <guid>https://x/b</guid>
      <pubDate>Tue, 05 Apr 2022 13:30:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#
        .to_string()
}

fn source() -> RssFeedSource {
    RssFeedSource::new(
        Fetcher::new(FetchConfig {
            user_agent: "RSS-Test/1.0".to_string(),
            timeout_seconds: 5,
            max_retries: 0,
            retry_delay_seconds: 1,
            max_feed_size_mb: 10,
            max_redirects: 5,
        })
        .unwrap(),
    )
}

fn feed_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_raw(world_feed(), "application/rss+xml")
        .insert_header("ETag", "\"v1\"")
        .insert_header("Last-Modified", LAST_MODIFIED)
}

#[tokio::test]
async fn test_unconditional_fetch_returns_entries_and_tokens() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world.xml"))
        .respond_with(feed_response())
        .mount(&server)
        .await;

    let url = format!("{}/world.xml", server.uri());
    let result = source().fetch_with(&url, &Condition::Unconditional).await.unwrap();

    assert_eq!(result.http_status, Some(200));
    assert!(!result.not_modified);
    assert_eq!(result.etag.as_deref(), Some("\"v1\""));
    assert_eq!(result.last_modified.as_deref(), Some(LAST_MODIFIED));
    assert!(result.feed_updated.is_some());
    assert!(result.bozo.is_none());

    assert_eq!(result.entries.len(), 2);
    let first = &result.entries[0];
    assert_eq!(first.title.as_deref(), Some("A"));
    assert_eq!(first.link.as_deref(), Some("https://x/a"));
    assert_eq!(first.summary.as_deref(), Some("First story"));
    assert!(first.guid_is_link());
    assert!(first.published.is_some());

    info!("Unconditional fetch test completed successfully!");
}

#[tokio::test]
async fn test_etag_cursor_sends_if_none_match() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world.xml"))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("ETag", "\"v1\""))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/world.xml"))
        .respond_with(feed_response())
        .mount(&server)
        .await;

    let mut cursor = FreshnessCursor::new(format!("{}/world.xml", server.uri()));
    cursor.etag = Some("\"v1\"".to_string());

    let result = source().fetch(&cursor, Some(FreshnessStrategy::Etag)).await.unwrap();

    assert!(result.not_modified);
    assert_eq!(result.http_status, Some(304));
    assert!(result.entries.is_empty());
    assert_eq!(result.etag.as_deref(), Some("\"v1\""));
}

#[tokio::test]
async fn test_last_modified_cursor_sends_if_modified_since() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world.xml"))
        .and(header("If-Modified-Since", LAST_MODIFIED))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let mut cursor = FreshnessCursor::new(format!("{}/world.xml", server.uri()));
    cursor.last_modified = Some(LAST_MODIFIED.to_string());
    cursor.etag = Some("\"v1\"".to_string());

    let result = source().fetch(&cursor, Some(FreshnessStrategy::LastModified)).await.unwrap();
    assert!(result.not_modified);
    assert!(!result.has_entries());
}

#[test]
fn test_condition_falls_back_to_unconditional() {
    let mut cursor = FreshnessCursor::new("https://x/world.xml");
    assert_eq!(Condition::select(Some(FreshnessStrategy::Etag), &cursor), Condition::Unconditional);
    assert_eq!(Condition::select(None, &cursor), Condition::Unconditional);

    cursor.last_modified = Some(LAST_MODIFIED.to_string());
    assert_eq!(Condition::select(Some(FreshnessStrategy::Etag), &cursor), Condition::Unconditional);
    assert_eq!(
        Condition::select(Some(FreshnessStrategy::LastModified), &cursor),
        Condition::IfModifiedSince(LAST_MODIFIED.to_string())
    );
    assert_eq!(Condition::select(None, &cursor), Condition::Unconditional);
}

#[tokio::test]
async fn test_odd_content_type_sets_bozo() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(world_feed(), "text/html"))
        .mount(&server)
        .await;

    let url = format!("{}/world.xml", server.uri());
    let result = source().fetch_with(&url, &Condition::Unconditional).await.unwrap();

    assert!(result.bozo.as_deref().unwrap_or_default().contains("text/html"));
    assert_eq!(result.entries.len(), 2);
}

#[tokio::test]
async fn test_unreadable_body_is_a_parse_error() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("this is not a feed", "application/rss+xml"))
        .mount(&server)
        .await;

    let url = format!("{}/broken.xml", server.uri());
    let result = source().fetch_with(&url, &Condition::Unconditional).await;
    assert!(matches!(result, Err(ArchiverError::Parse(_))));
}

#[tokio::test]
async fn test_server_error_is_a_status_error() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/world.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/world.xml", server.uri());
    let error = source().fetch_with(&url, &Condition::Unconditional).await.unwrap_err();
    assert!(matches!(error, ArchiverError::Status { status: 500, .. }));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_oversized_feed_is_rejected() {
    init_tracing();

    let server = MockServer::start().await;
    let mut body = world_feed().into_bytes();
    body.extend(std::iter::repeat(b' ').take(2 * 1024 * 1024));
    Mock::given(method("GET"))
        .and(path("/huge.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/rss+xml"))
        .mount(&server)
        .await;

    let source = RssFeedSource::new(
        Fetcher::new(FetchConfig {
            timeout_seconds: 5,
            max_retries: 0,
            max_feed_size_mb: 1,
            ..FetchConfig::default()
        })
        .unwrap(),
    );

    let url = format!("{}/huge.xml", server.uri());
    let error = source.fetch_with(&url, &Condition::Unconditional).await.unwrap_err();
    assert!(matches!(error, ArchiverError::FeedTooLarge { size_mb: 2 }));
}
