use rss_archiver::{ArchiverError, ArticleFetcher, FeedEntry, FetchConfig, Fetcher};
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use tracing::info;
use wiremock::matchers::{method, path};
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

fn test_fetcher() -> Fetcher {
    Fetcher::new(FetchConfig {
        user_agent: "RSS-Test/1.0".to_string(),
        timeout_seconds: 5,
        max_retries: 0,
        retry_delay_seconds: 1,
        max_feed_size_mb: 10,
        max_redirects: 5,
    })
    .unwrap()
}

fn linked(link: &str) -> FeedEntry {
    FeedEntry {
        id: link.to_string(),
        title: None,
        title_detail: None,
        links: Vec::new(),
        link: Some(link.to_string()),
        summary: None,
        summary_detail: None,
        published: None,
        source: None,
    }
}

#[test]
fn test_document_path_uses_last_path_segment() {
    let dir = Path::new("/data/st/world");

    assert_eq!(
        ArticleFetcher::document_path(dir, "https://x/world/story-one?ref=rss#top").unwrap(),
        dir.join("story-one.html")
    );
    assert_eq!(
        ArticleFetcher::document_path(dir, "https://x/world/story-two/").unwrap(),
        dir.join("story-two.html")
    );
    assert_eq!(
        ArticleFetcher::document_path(dir, "https://news.example.com").unwrap(),
        dir.join("news.example.com.html")
    );
    assert!(matches!(
        ArticleFetcher::document_path(dir, "not a link"),
        Err(ArchiverError::UnusableLink(_))
    ));
}

#[tokio::test]
async fn test_failed_article_does_not_stop_the_rest() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>A</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/latin1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x3c, 0x70, 0x3e, 0xe9, 0xff, 0xfe]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>B</html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let articles = ArticleFetcher::new(test_fetcher(), None);
    let entries = vec![
        linked(&format!("{}/news/a", server.uri())),
        linked(&format!("{}/news/missing", server.uri())),
        linked(&format!("{}/news/latin1", server.uri())),
        linked(&format!("{}/news/b", server.uri())),
    ];

    let report = articles.download_all(dir.path(), &entries).await;

    assert_eq!(report.stored, vec![dir.path().join("a.html"), dir.path().join("b.html")]);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[0].ends_with("/news/missing"));
    assert!(report.failed[1].ends_with("/news/latin1"));

    assert_eq!(std::fs::read_to_string(dir.path().join("b.html")).unwrap(), "<html>B</html>");
    assert!(!dir.path().join("missing.html").exists());
    assert!(!dir.path().join("latin1.html").exists());

    info!("Article isolation test completed successfully!");
}

#[tokio::test]
async fn test_non_utf8_article_is_a_decode_error() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/story"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xc3, 0x28]))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let articles = ArticleFetcher::new(test_fetcher(), None);

    let result = articles.download(dir.path(), &format!("{}/story", server.uri())).await;
    assert!(matches!(result, Err(ArchiverError::Decode { .. })));
}

#[tokio::test]
async fn test_article_download_is_not_retried() {
    init_tracing();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = Fetcher::new(FetchConfig {
        max_retries: 3,
        retry_delay_seconds: 1,
        ..FetchConfig::default()
    })
    .unwrap();
    let articles = ArticleFetcher::new(fetcher, None);

    let result = articles.download(dir.path(), &format!("{}/flaky", server.uri())).await;
    assert!(matches!(result, Err(ArchiverError::Status { status: 503, .. })));
}
