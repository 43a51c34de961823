//! Integration tests for the source drivers.
//!
//! These tests run whole crawls against a mock pixiv API: discovery,
//! resolution, and download, checking the summary counters and the files
//! left on disk.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use pixivfetch_core::crawlers::{Pipeline, SearchMode, SearchOrder};
use pixivfetch_core::{
    BookmarkCrawler, Config, CrawlError, Crawler, KeywordCrawler, RankingCrawler, UserCrawler,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(api_base: &str, store: &Path) -> Config {
    let mut config = Config::default();
    config.network.api_base = api_base.to_string();
    config.download.store_path = store.to_path_buf();
    config.download.num_threads = 2;
    config.download.download_delay_secs = 0;
    config.download.fail_times = 1;
    config
}

async fn mount_pages(server: &MockServer, illust_id: &str, urls: &[String]) {
    let pages: Vec<_> = urls
        .iter()
        .map(|u| json!({"urls": {"original": u}}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/ajax/illust/{illust_id}/pages")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"error": false, "message": "", "body": pages})),
        )
        .mount(server)
        .await;
}

async fn mount_asset(server: &MockServer, path_str: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_user_crawler_downloads_whole_gallery() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ajax/user/9000/profile/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "message": "",
            "body": {"illusts": {"100": null, "101": null}},
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url_100 = vec![format!("{}/img/100_p0.png", mock_server.uri())];
    let url_101 = vec![format!("{}/img/101_p0.png", mock_server.uri())];
    mount_pages(&mock_server, "100", &url_100).await;
    mount_pages(&mock_server, "101", &url_101).await;
    mount_asset(&mock_server, "/img/100_p0.png", b"first").await;
    mount_asset(&mock_server, "/img/101_p0.png", b"second").await;

    let config = Arc::new(test_config(&mock_server.uri(), temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");
    let crawler = UserCrawler::new(pipeline, "9000");
    let summary = crawler.run().await.expect("crawl should succeed");

    assert_eq!(summary.identifiers, 2);
    assert_eq!(summary.images, 2);
    assert_eq!(summary.download.downloaded(), 2);
    assert_eq!(summary.download.failed(), 0);
    assert!(temp_dir.path().join("100/100_p0.png").exists());
    assert!(temp_dir.path().join("101/101_p0.png").exists());
}

#[tokio::test]
async fn test_ranking_crawler_requests_date_and_mode() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ranking.php"))
        .and(query_param("mode", "daily"))
        .and(query_param("date", "20200804"))
        .and(query_param("p", "1"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "contents": [{"illust_id": 100}],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let urls = vec![format!("{}/img/100_p0.png", mock_server.uri())];
    mount_pages(&mock_server, "100", &urls).await;
    mount_asset(&mock_server, "/img/100_p0.png", b"ranked").await;

    let config = Arc::new(test_config(&mock_server.uri(), temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");
    let crawler = RankingCrawler::new(
        pipeline,
        vec!["daily".to_string()],
        NaiveDate::from_ymd_opt(2020, 8, 4).expect("valid date"),
        1,
        50,
    );
    let summary = crawler.run().await.expect("crawl should succeed");

    assert_eq!(summary.identifiers, 1);
    assert_eq!(summary.download.downloaded(), 1);
}

#[tokio::test]
async fn test_ranking_crawler_keeps_earlier_dates_when_later_date_dies() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ranking.php"))
        .and(query_param("date", "20200804"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "contents": [{"illust_id": 100}],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ranking.php"))
        .and(query_param("date", "20200805"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let urls = vec![format!("{}/img/100_p0.png", mock_server.uri())];
    mount_pages(&mock_server, "100", &urls).await;
    mount_asset(&mock_server, "/img/100_p0.png", b"day one").await;

    let config = Arc::new(test_config(&mock_server.uri(), temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");
    let crawler = RankingCrawler::new(
        pipeline,
        vec!["daily".to_string()],
        NaiveDate::from_ymd_opt(2020, 8, 4).expect("valid date"),
        2,
        50,
    );
    let summary = crawler
        .run()
        .await
        .expect("a dead later date must not abort the crawl");

    assert_eq!(summary.identifiers, 1);
    assert_eq!(summary.download.downloaded(), 1);
    assert!(temp_dir.path().join("100/100_p0.png").exists());
}

#[tokio::test]
async fn test_ranking_crawler_aborts_when_first_date_dies() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ranking.php"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1) // nothing discovered yet, no second date is tried
        .mount(&mock_server)
        .await;

    let config = Arc::new(test_config(&mock_server.uri(), temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");
    let crawler = RankingCrawler::new(
        pipeline,
        vec!["daily".to_string()],
        NaiveDate::from_ymd_opt(2020, 8, 4).expect("valid date"),
        2,
        50,
    );
    let result = crawler.run().await;

    assert!(
        matches!(result, Err(CrawlError::Fetch(_))),
        "expected Fetch error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_keyword_crawler_pages_until_results_run_out() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ajax/search/artworks/landscape"))
        .and(query_param("p", "1"))
        .and(query_param("order", "date_d"))
        .and(query_param("mode", "safe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "message": "",
            "body": {"illustManga": {"data": [{"id": "100"}, {"id": "101"}]}},
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/search/artworks/landscape"))
        .and(query_param("p", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "message": "",
            "body": {"illustManga": {"data": []}},
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_pages(&mock_server, "100", &[]).await;
    mount_pages(&mock_server, "101", &[]).await;

    let config = Arc::new(test_config(&mock_server.uri(), temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");
    let crawler = KeywordCrawler::new(
        pipeline,
        "landscape",
        SearchOrder::DateDescending,
        SearchMode::Safe,
        100,
    );
    let summary = crawler.run().await.expect("crawl should succeed");

    assert_eq!(summary.identifiers, 2);
}

#[tokio::test]
async fn test_keyword_crawler_stops_at_requested_count() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ajax/search/artworks/landscape"))
        .and(query_param("p", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "message": "",
            "body": {"illustManga": {"data": [{"id": "100"}, {"id": "101"}, {"id": "102"}]}},
        })))
        .expect(1) // the cap is reached on page one, no second request
        .mount(&mock_server)
        .await;

    mount_pages(&mock_server, "100", &[]).await;
    mount_pages(&mock_server, "101", &[]).await;

    let config = Arc::new(test_config(&mock_server.uri(), temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");
    let crawler = KeywordCrawler::new(
        pipeline,
        "landscape",
        SearchOrder::DateDescending,
        SearchMode::Safe,
        2,
    );
    let summary = crawler.run().await.expect("crawl should succeed");

    assert_eq!(summary.identifiers, 2);
}

#[tokio::test]
async fn test_bookmark_crawler_pages_by_offset() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ajax/user/22821761/illusts/bookmarks"))
        .and(query_param("offset", "0"))
        .and(query_param("rest", "show"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "message": "",
            "body": {"total": 2, "works": [{"id": "100"}, {"id": "101"}]},
        })))
        .expect(1) // total=2 fits in one page, no offset=48 request
        .mount(&mock_server)
        .await;

    mount_pages(&mock_server, "100", &[]).await;
    mount_pages(&mock_server, "101", &[]).await;

    let mut config = test_config(&mock_server.uri(), temp_dir.path());
    config.user.cookie = Some("PHPSESSID=abc".to_string());
    config.user.user_id = Some("22821761".to_string());
    let pipeline = Pipeline::new(Arc::new(config)).expect("pipeline should build");
    let crawler = BookmarkCrawler::new(pipeline, 200);
    let summary = crawler.run().await.expect("crawl should succeed");

    assert_eq!(summary.identifiers, 2);
}

#[tokio::test]
async fn test_bookmark_crawler_requires_credentials() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let config = Arc::new(test_config("http://127.0.0.1:1", temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");

    let crawler = BookmarkCrawler::new(pipeline, 10);
    let result = crawler.run().await;

    assert!(
        matches!(
            result,
            Err(CrawlError::MissingCredential {
                field: "cookie",
                ..
            })
        ),
        "expected MissingCredential, got: {result:?}"
    );
}

#[tokio::test]
async fn test_crawler_propagates_dead_discovery_endpoint() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/ajax/user/9000/profile/all"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let config = Arc::new(test_config(&mock_server.uri(), temp_dir.path()));
    let pipeline = Pipeline::new(config).expect("pipeline should build");
    let crawler = UserCrawler::new(pipeline, "9000");
    let result = crawler.run().await;

    assert!(
        matches!(result, Err(CrawlError::Fetch(_))),
        "expected Fetch error, got: {result:?}"
    );
}
