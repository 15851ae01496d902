//! End-to-end tests of the feed view pipeline through the public API
//!
//! A scripted collector and an HTTP file host (wiremock) stand in for the
//! remote services; triggers go in through the bus handler and encrypted
//! batches come out of `insertViewData`.

mod common;

use common::{PlainCipher, ScriptedCollector, record_blob, views_response, wait_until};
use datasource_mapper::{
    Config, FeedViewProcessor, FileHostConfig, HttpFileHost, MessageKind, hash_to_id,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NEWS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://news.example</link>
    <description>Latest</description>
    <item>
      <title>First story</title>
      <link>https://news.example/first</link>
      <pubDate>Tue, 01 Oct 2024 12:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Second story</title>
      <link>https://news.example/second</link>
      <pubDate>Wed, 02 Oct 2024 12:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

async fn processor(
    dir: &TempDir,
    server: &MockServer,
    collector: Arc<ScriptedCollector>,
) -> FeedViewProcessor {
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        request_timeout: Duration::from_secs(5),
        filehost: FileHostConfig {
            url: Some(server.uri()),
            timeout: Duration::from_secs(5),
        },
        ..Config::default()
    };
    let file_host = Arc::new(HttpFileHost::new(&config.filehost).unwrap());
    FeedViewProcessor::new(config, collector, file_host, Arc::new(PlainCipher))
        .await
        .unwrap()
}

#[tokio::test]
async fn process_command_uploads_reencrypted_items() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/filehost/files/rec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(record_blob("kdata", NEWS)))
        .mount(&server)
        .await;

    let collector = Arc::new(ScriptedCollector::default());
    *collector.views.lock().unwrap() = Some(views_response(&["view-1"], "rss"));
    collector.push_page(&[("rec-1", 1_727_800_000_000)], &["kdata"]);

    let service = processor(&dir, &server, collector.clone()).await;
    service.start_workers();

    let reply = service
        .handle_message(
            MessageKind::Command,
            "processFeedView",
            &json!({"feed_id": "feed-1", "feed_view_id": "view-1"}),
        )
        .await;
    assert!(reply.ok, "reply: {reply:?}");

    let watched = collector.clone();
    assert!(wait_until(move || !watched.uploads().is_empty()).await);
    service.shutdown().await;

    let uploads = collector.uploads();
    assert_eq!(uploads.len(), 1);
    let batch = &uploads[0];
    assert_eq!(batch.feed_view_id, "view-1");
    assert!(batch.truncate, "processFeedView resets by default");
    assert!(!batch.deduplicate);
    assert_eq!(batch.data.len(), 2);

    let first = &batch.data[0];
    assert_eq!(first.encrypted_data.key_id.as_deref(), Some("kview"));
    assert_eq!(first.encrypted_data.nonce, "sealed-kview");
    assert_eq!(first.pub_date, 1_727_784_000_000);

    let cleartext: serde_json::Value =
        serde_json::from_str(&first.encrypted_data.ciphertext_base64).unwrap();
    assert_eq!(cleartext["label"], "First story");
    assert_eq!(cleartext["urls"]["https://news.example/first"], "main");

    let requests = collector.data_requests();
    assert_eq!(requests[0].batch_start, 0);
    assert_eq!(requests.last().unwrap().skip, 1);
}

#[tokio::test]
async fn update_event_resumes_from_the_watermark() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/filehost/files/rec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(record_blob("kdata", NEWS)))
        .mount(&server)
        .await;

    let collector = Arc::new(ScriptedCollector::default());
    *collector.views.lock().unwrap() = Some(views_response(&["view-1"], "rss"));
    collector.push_page(&[("rec-1", 500)], &["kdata"]);

    let service = processor(&dir, &server, collector.clone()).await;
    service.start_workers();

    let payload = json!({"feed_id": "feed-1"});
    assert!(
        service
            .handle_message(MessageKind::Event, "feedDataUpdated", &payload)
            .await
            .ok
    );
    let watched = collector.clone();
    assert!(wait_until(move || watched.uploads().len() == 1).await);

    // Nothing new: the second run starts at the watermark and uploads nothing
    let watched = collector.clone();
    let before = collector.data_requests().len();
    assert!(
        service
            .handle_message(MessageKind::Event, "feedDataUpdated", &payload)
            .await
            .ok
    );
    assert!(wait_until(move || watched.data_requests().len() > before).await);
    service.shutdown().await;

    let uploads = collector.uploads();
    assert_eq!(uploads.len(), 1);
    assert!(!uploads[0].truncate, "feedDataUpdated does not reset");
    let last = collector.data_requests().pop().unwrap();
    assert_eq!(last.batch_start, 500);
    assert_eq!(last.skip, 0);
}

#[tokio::test]
async fn identical_content_yields_identical_ids() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(record_blob("kdata", NEWS)))
        .mount(&server)
        .await;

    let collector = Arc::new(ScriptedCollector::default());
    *collector.views.lock().unwrap() = Some(views_response(&["view-1"], "rss"));
    collector.push_page(&[("rec-1", 10), ("rec-2", 20)], &["kdata"]);

    let service = processor(&dir, &server, collector.clone()).await;
    service.start_workers();
    service
        .handle_message(MessageKind::Command, "processFeedView", &json!({"feed_id": "feed-1"}))
        .await;
    let watched = collector.clone();
    assert!(wait_until(move || !watched.uploads().is_empty()).await);
    service.shutdown().await;

    let items = &collector.uploads()[0].data;
    assert_eq!(items.len(), 4);
    assert_eq!(items[0].data_id, items[2].data_id);
    assert_eq!(items[1].data_id, items[3].data_id);
    assert_ne!(items[0].data_id, items[1].data_id);
    assert_eq!(items[0].data_id.len(), hash_to_id(&json!("x")).len());
}

#[tokio::test]
async fn unreachable_record_abandons_the_job() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let collector = Arc::new(ScriptedCollector::default());
    *collector.views.lock().unwrap() = Some(views_response(&["view-1"], "rss"));
    collector.push_page(&[("missing", 10)], &["kdata"]);

    let service = processor(&dir, &server, collector.clone()).await;
    service.start_workers();
    service
        .handle_message(MessageKind::Command, "processFeedView", &json!({"feed_id": "feed-1"}))
        .await;
    let watched = collector.clone();
    assert!(wait_until(move || !watched.data_requests().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    service.shutdown().await;

    assert!(collector.uploads().is_empty());
    assert_eq!(collector.data_requests().len(), 1);
}
