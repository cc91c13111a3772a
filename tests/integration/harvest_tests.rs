//! Integration tests for harvesting
//!
//! These tests use wiremock to serve catalog result pages and run the
//! fetcher, the crawl and whole harvests against them end-to-end.

use sat_harvest::config::DedupPolicy;
use sat_harvest::crawler::{
    harvest, Credentials, FetchError, Fetcher, Harvester, HttpFetcher, StopSignal,
};
use sat_harvest::feed::{FeedDocument, LinkPolicy, Navigator};
use sat_harvest::query::SearchQuery;
use sat_harvest::sink::{PublishSink, RecordingQueue};
use sat_harvest::storage::{self, SqliteStorage, Storage};
use sat_harvest::{HarvestError, Record, RunStatus};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/dhus/api/search";
const POLYGON: &str = "POLYGON((2 51,4 51,4 55,2 54,2 51))";

/// One result entry in the shape the catalog serves
fn entry(id: &str, base: &str) -> String {
    format!(
        r#"<entry>
            <title>S2A_{id}</title>
            <link href="{base}/odata/v1/Products('{id}')/$value"/>
            <link rel="alternative" href="{base}/odata/v1/Products('{id}')/"/>
            <id>{id}</id>
            <str name="identifier">S2A_MSIL1C_{id}</str>
            <str name="footprint">{POLYGON}</str>
        </entry>"#
    )
}

/// A result page with the given entries and an optional `next` link
fn feed_page(ids: &[&str], base: &str, next: Option<&str>) -> String {
    let entries: String = ids.iter().map(|id| entry(id, base)).collect();
    let next = next
        .map(|href| format!(r#"<link rel="next" href="{}"/>"#, href.replace('&', "&amp;")))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom"
              xmlns:opensearch="http://a9.com/-/spec/opensearch/1.1/">
            <title>Sentinels Scientific Data Hub search results</title>
            <opensearch:totalResults>{}</opensearch:totalResults>
            <link rel="self" type="application/atom+xml" href="{base}{SEARCH_PATH}"/>
            {next}
            {entries}
        </feed>"#,
        ids.len()
    )
}

/// Mounts a two page result feed: A, B on the first page, B, C on the second
async fn mount_two_pages(server: &MockServer) {
    let base = server.uri();
    let second = format!("{}{}?q=x&start=2", base, SEARCH_PATH);

    // More specific mock first so it wins over the seed page
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("start", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(feed_page(&["B", "C"], &base, None)),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(feed_page(&["A", "B"], &base, Some(&second))),
        )
        .mount(server)
        .await;
}

fn search_query(server: &MockServer) -> SearchQuery {
    SearchQuery::new(&format!("{}{}", server.uri(), SEARCH_PATH), POLYGON)
        .expect("Failed to build query")
}

fn http_fetcher(max_retries: u32) -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::with_client(
        reqwest::Client::new(),
        max_retries,
        Duration::from_millis(10),
    ))
}

/// Harvester following only `next` links, as the catalog paginates
fn harvester(queue: Arc<RecordingQueue>) -> Harvester {
    let policy = LinkPolicy::new(vec!["next".to_string()], None);
    Harvester::new(
        http_fetcher(0),
        Credentials::new("user", "pass"),
        PublishSink::new(queue, "crisis_crawl"),
    )
    .with_navigator(Navigator::new(policy))
}

fn published_ids(queue: &RecordingQueue) -> Vec<String> {
    queue
        .published_messages()
        .iter()
        .map(|m| {
            queue
                .deserialize_message::<Record>(m)
                .expect("Failed to decode message")
                .id
        })
        .collect()
}

#[test]
fn test_result_page_with_query_link_parses() {
    let next = "http://127.0.0.1:9/dhus/api/search?q=x&start=2&rows=2";
    let page = feed_page(&["A", "B"], "http://127.0.0.1:9", Some(next));

    let doc = FeedDocument::parse(&page).expect("Result page should be well-formed");
    assert_eq!(doc.entries().count(), 2);
    assert!(doc.links().iter().any(|link| link.href == next));
}

#[tokio::test]
async fn test_fetcher_sends_basic_auth() {
    let server = MockServer::start().await;

    // base64("user:pass")
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}{}", server.uri(), SEARCH_PATH)).unwrap();
    let response = http_fetcher(0)
        .fetch(&url, &Credentials::new("user", "pass"))
        .await
        .expect("Fetch failed");

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"ok");
}

#[tokio::test]
async fn test_fetcher_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}{}", server.uri(), SEARCH_PATH)).unwrap();
    let response = http_fetcher(2)
        .fetch(&url, &Credentials::new("user", "pass"))
        .await
        .expect("Fetch should succeed after a retry");

    assert!(response.is_success());
}

#[tokio::test]
async fn test_fetcher_does_not_retry_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}{}", server.uri(), SEARCH_PATH)).unwrap();
    let result = http_fetcher(3)
        .fetch(&url, &Credentials::new("user", "wrong"))
        .await;

    assert_eq!(result.unwrap_err(), FetchError::Status { status: 401 });
}

#[tokio::test]
async fn test_harvest_follows_pages_and_publishes_once() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let queue = Arc::new(RecordingQueue::new());
    let report = harvester(queue.clone())
        .run(&search_query(&server), &StopSignal::new())
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.pages_fetched, 2);
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(report.published, 3);
    assert_eq!(published_ids(&queue), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_published_record_fields() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let queue = Arc::new(RecordingQueue::new());
    harvester(queue.clone())
        .run(&search_query(&server), &StopSignal::new())
        .await;

    let messages = queue.published_messages();
    assert!(messages.iter().all(|m| m.topic == "crisis_crawl"));

    let first: Record = queue.deserialize_message(&messages[0]).unwrap();
    let base = server.uri();
    assert_eq!(first.id, "A");
    assert_eq!(first.identifier, "S2A_MSIL1C_A");
    assert_eq!(first.metadata, format!("{}/odata/v1/Products('A')/", base));
    assert_eq!(first.download, format!("{}/odata/v1/Products('A')/$value", base));
    assert_eq!(first.footprint, POLYGON);
}

#[tokio::test]
async fn test_failed_page_does_not_end_harvest() {
    let server = MockServer::start().await;
    let base = server.uri();
    let broken = format!("{}{}?q=x&start=2", base, SEARCH_PATH);

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(feed_page(&["A"], &base, Some(&broken))),
        )
        .mount(&server)
        .await;

    let queue = Arc::new(RecordingQueue::new());
    let report = harvester(queue.clone())
        .run(&search_query(&server), &StopSignal::new())
        .await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.pages_fetched, 1);
    assert_eq!(report.stats.pages_failed_fetch, 1);
    assert_eq!(published_ids(&queue), vec!["A"]);
}

#[tokio::test]
async fn test_persistent_dedup_across_runs() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state").join("harvest.db");

    {
        let storage = storage::shared(SqliteStorage::new(&db_path).unwrap());
        let queue = Arc::new(RecordingQueue::new());
        let report = harvester(queue)
            .with_storage(storage)
            .with_dedup_policy(DedupPolicy::Persistent)
            .run(&search_query(&server), &StopSignal::new())
            .await;
        assert_eq!(report.published, 3);
    }

    let storage = storage::shared(SqliteStorage::new(&db_path).unwrap());
    let queue = Arc::new(RecordingQueue::new());
    let report = harvester(queue.clone())
        .with_storage(storage.clone())
        .with_dedup_policy(DedupPolicy::Persistent)
        .run(&search_query(&server), &StopSignal::new())
        .await;

    assert_eq!(report.published, 0);
    assert_eq!(report.stats.duplicates, 4);
    assert_eq!(queue.attempt_count(), 0);

    let guard = storage::lock(&storage);
    assert_eq!(guard.count_delivered().unwrap(), 3);
    assert_eq!(guard.list_runs(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_harvest_with_unreachable_broker_records_failed_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("harvest.db");

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[catalog]
endpoint = "{}{}"
username = "user"
password = "pass"

[query]
polygon = "{}"

[broker]
url = "nats://127.0.0.1:1"

[state]
database-path = "{}"
"#,
        server.uri(),
        SEARCH_PATH,
        POLYGON,
        db_path.display()
    )
    .unwrap();

    let (config, hash) =
        sat_harvest::config::load_config_with_hash(file.path()).expect("Config should load");
    let result = harvest(&config, &hash, &StopSignal::new()).await;

    assert!(matches!(result, Err(HarvestError::Broker(_))));

    let storage = SqliteStorage::new(&db_path).unwrap();
    let latest = storage.get_latest_run().unwrap().expect("Run should be recorded");
    assert_eq!(latest.status, RunStatus::Failed);
    assert_eq!(latest.config_hash, hash);
}
