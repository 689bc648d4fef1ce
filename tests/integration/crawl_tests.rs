//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock directory sites and test
//! the full traversal cycle end-to-end.

use listing_harvester::config::Config;
use listing_harvester::crawler::{Coordinator, DirectoryParser, Fetcher, RequestProfile, StopSignal};
use listing_harvester::listing::Record;
use listing_harvester::output::{ShardReport, WriteMode};
use listing_harvester::state::Termination;
use listing_harvester::url::SearchQuery;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_AGENT: &str = "HarvestTest/1.0";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, output: &Path) -> Config {
    let mut config = Config::default();
    config.site.base_url = server.uri();
    config.site.search_path = "/search".to_string();
    config.crawler.workers = 3;
    config.crawler.min_interval_ms = 0; // no pacing in tests
    config.fetch.timeout_secs = 5;
    config.fetch.max_attempts = 3;
    config.fetch.retry_delay_min_ms = 0;
    config.fetch.retry_delay_max_ms = 0;
    config.output.directory = output.to_string_lossy().into_owned();
    config.output.mode = WriteMode::Truncate;
    config
}

fn coordinator(config: Config) -> Coordinator {
    let fetcher = Fetcher::new(&config.fetch).expect("client builds");
    Coordinator::with_parts(
        config,
        fetcher,
        Arc::new(DirectoryParser),
        RequestProfile::new(TEST_AGENT, "CONSENT=YES+"),
    )
    .expect("valid base URL")
}

fn listing(name: &str, detail_ref: &str) -> Value {
    json!({
        "@type": "LocalBusiness",
        "name": name,
        "url": detail_ref,
        "telephone": "040 555",
        "address": {"@type": "PostalAddress", "postalCode": "22041", "addressLocality": "Hamburg"}
    })
}

/// Builds a result page carrying `listings` as an ItemList block
fn result_page(listings: Vec<Value>, next: Option<&str>) -> String {
    let elements: Vec<Value> = listings
        .into_iter()
        .enumerate()
        .map(|(i, item)| json!({"@type": "ListItem", "position": i + 1, "item": item}))
        .collect();
    let block = json!({"@context": "https://schema.org", "@type": "ItemList", "itemListElement": elements});
    let next_link = next
        .map(|href| format!(r#"<a title="zur nächsten Seite" href="{}">weiter</a>"#, href))
        .unwrap_or_default();

    format!(
        r#"<html><head><script type="application/ld+json">{}</script></head>
        <body><div data-hits="42"></div>{}</body></html>"#,
        block, next_link
    )
}

fn detail_page(mail: &str, website: &str) -> String {
    format!(
        r#"<html><body><div class="lnks">
        <a class="mail" title="{}" href="mailto:{}">E-Mail</a>
        <a class="www" href="{}">Website</a>
        </div></body></html>"#,
        mail, mail, website
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

async fn mount_detail(server: &MockServer, detail_path: &str, mail: &str, website: &str) {
    Mock::given(method("GET"))
        .and(path(detail_path))
        .respond_with(html(detail_page(mail, website)))
        .mount(server)
        .await;
}

fn read_records(report: &ShardReport) -> Vec<Record> {
    std::fs::read_to_string(&report.sink)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("well-formed record"))
        .collect()
}

#[tokio::test]
async fn test_single_page_single_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let stub = json!({
        "@type": "LocalBusiness",
        "name": "Acme",
        "url": "/d/1",
        "geo": {"lat": "53.5", "lon": "10.0"},
        "address": {"postalCode": "22"},
        "telephone": "040 123"
    });

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("kw", "acme"))
        .and(header("user-agent", TEST_AGENT))
        .and(header("cookie", "CONSENT=YES+"))
        .respond_with(html(result_page(vec![stub], None)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/d/1"))
        .and(header("user-agent", TEST_AGENT))
        .respond_with(html(detail_page("info@acme.de", "acme.de")))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("acme"), None).await;

    assert!(report.error.is_none(), "unexpected error: {:?}", report.error);
    assert_eq!(report.termination, Some(Termination::Exhausted));
    assert_eq!(report.pages, 1);
    assert_eq!(report.total_hits, 42);

    let lines = std::fs::read_to_string(&report.sink).unwrap();
    let records: Vec<Value> = lines.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["coordinates"], json!([53.5, 10.0]));
    assert_eq!(record["address"]["postalCode"], "00022");
    assert_eq!(record["telephone"], "040123");
    assert_eq!(record["mailAddress"], "info@acme.de");
    assert_eq!(record["website"], "acme.de");
    assert!(record.get("url").is_none());
}

#[tokio::test]
async fn test_malformed_second_page_keeps_first_page_records() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(
            vec![listing("Acme", "/d/1"), listing("Beta", "/d/2")],
            Some("/results/2"),
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/results/2"))
        .respond_with(html("<html><body><p>Wartungsarbeiten</p></body></html>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;
    mount_detail(&server, "/d/2", "mail@beta.de", "https://beta.de").await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("b"), None).await;

    assert!(report.error.is_none());
    assert_eq!(report.termination, Some(Termination::MalformedPage));
    assert_eq!(report.pages, 2);
    assert_eq!(read_records(&report).len(), 2);
}

#[tokio::test]
async fn test_detail_404_yields_record_without_contact() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(
            vec![
                listing("Acme", "/d/1"),
                listing("Gone", "/d/404"),
                listing("Beta", "/d/2"),
            ],
            None,
        )))
        .mount(&server)
        .await;

    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;
    mount_detail(&server, "/d/2", "mail@beta.de", "https://beta.de").await;

    // non-retriable: exactly one request
    Mock::given(method("GET"))
        .and(path("/d/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("c"), None).await;

    assert_eq!(report.listings.written, 2);
    assert_eq!(report.listings.partial, 1);

    let records = read_records(&report);
    assert_eq!(records.len(), 3);
    let gone = records
        .iter()
        .find(|r| r.name.as_deref() == Some("Gone"))
        .expect("listing with failed detail page is kept");
    assert_eq!(gone.mail_address, "");
    assert_eq!(gone.website, "");
}

#[tokio::test]
async fn test_result_page_retry_ceiling() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("down"), None).await;

    assert!(report.error.is_none());
    assert_eq!(report.termination, Some(Termination::FetchFailed));
    assert_eq!(report.pages, 0);
    assert!(read_records(&report).is_empty());
}

#[tokio::test]
async fn test_detail_retry_exhaustion_keeps_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(vec![listing("Flaky", "/d/9")], None)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/d/9"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("flaky"), None).await;

    assert_eq!(report.listings.partial, 1);
    let records = read_records(&report);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_deref(), Some("Flaky"));
    assert_eq!(records[0].mail_address, "");
}

#[tokio::test]
async fn test_incomplete_listing_is_skipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let bare = json!({"@type": "LocalBusiness", "name": "Nameless Stub", "telephone": "040 1"});

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(vec![bare, listing("Acme", "/d/1")], None)))
        .mount(&server)
        .await;
    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("skip"), None).await;

    assert_eq!(report.listings.skipped, 1);
    assert_eq!(report.listings.written, 1);
    let records = read_records(&report);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_empty_page_touches_neither_pool_nor_sink() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(Vec::new(), Some("/results/2"))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/results/2"))
        .respond_with(html(result_page(vec![listing("Late", "/d/1")], None)))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("empty"), None).await;

    assert_eq!(report.termination, Some(Termination::NoEntries));
    assert_eq!(report.listings.total(), 0);
    assert!(read_records(&report).is_empty());
}

#[tokio::test]
async fn test_shard_failure_does_not_abort_siblings() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("ci", "11111"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("ci", "22041"))
        .respond_with(html(result_page(vec![listing("Acme", "/d/1")], None)))
        .mount(&server)
        .await;

    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let shards = vec!["11111".to_string(), "22041".to_string()];
    let stats = coordinator.run_query(&SearchQuery::new("Bäcker"), &shards).await;

    assert_eq!(stats.shards.len(), 2);
    assert_eq!(stats.shards[0].termination, Some(Termination::FetchFailed));
    assert_eq!(stats.shards[1].termination, Some(Termination::Exhausted));
    assert_ne!(stats.shards[0].sink, stats.shards[1].sink);
    assert_eq!(read_records(&stats.shards[1]).len(), 1);
    assert_eq!(stats.totals().written, 1);
}

#[tokio::test]
async fn test_page_budget_stops_pagination() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(vec![listing("Acme", "/d/1")], Some("/results/2"))))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/results/2"))
        .respond_with(html(result_page(vec![listing("Beta", "/d/2")], None)))
        .expect(0)
        .mount(&server)
        .await;

    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;

    let mut config = create_test_config(&server, dir.path());
    config.crawler.max_pages = 1;
    let report = coordinator(config).run_shard(&SearchQuery::new("budget"), None).await;

    assert_eq!(report.termination, Some(Termination::PageBudget));
    assert_eq!(report.pages, 1);
    assert_eq!(read_records(&report).len(), 1);
}

#[tokio::test]
async fn test_record_budget_caps_dispatch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(
            vec![
                listing("A", "/d/1"),
                listing("B", "/d/2"),
                listing("C", "/d/3"),
            ],
            Some("/results/2"),
        )))
        .mount(&server)
        .await;

    for n in 1..=3 {
        mount_detail(&server, &format!("/d/{}", n), "info@acme.de", "https://acme.de").await;
    }

    let mut config = create_test_config(&server, dir.path());
    config.crawler.max_records = 2;
    let report = coordinator(config).run_shard(&SearchQuery::new("records"), None).await;

    assert_eq!(report.termination, Some(Termination::RecordBudget));
    assert_eq!(read_records(&report).len(), 2);
}

#[tokio::test]
async fn test_duplicate_listings_enriched_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(vec![listing("Acme", "/d/1")], Some("/results/2"))))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/results/2"))
        .respond_with(html(result_page(
            vec![listing("Acme", "/d/1"), listing("Beta", "/d/2")],
            None,
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/d/1"))
        .respond_with(html(detail_page("info@acme.de", "https://acme.de")))
        .expect(1)
        .mount(&server)
        .await;
    mount_detail(&server, "/d/2", "mail@beta.de", "https://beta.de").await;

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let report = coordinator.run_shard(&SearchQuery::new("dupes"), None).await;

    assert_eq!(report.duplicates, 1);
    assert_eq!(read_records(&report).len(), 2);
}

#[tokio::test]
async fn test_url_list_shares_one_sink() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/list/a"))
        .respond_with(html(result_page(vec![listing("A", "/d/1")], None)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list/b"))
        .respond_with(html(result_page(vec![listing("B", "/d/2"), listing("C", "/d/3")], None)))
        .mount(&server)
        .await;

    for n in 1..=3 {
        mount_detail(&server, &format!("/d/{}", n), "info@acme.de", "https://acme.de").await;
    }

    let coordinator = coordinator(create_test_config(&server, dir.path()));
    let urls = vec![
        format!("{}/list/a", server.uri()),
        format!("{}/list/b", server.uri()),
        "not-a-url".to_string(),
    ];
    let stats = coordinator
        .run_url_list(urls, WriteMode::Truncate)
        .await
        .unwrap();

    assert_eq!(stats.shards.len(), 3);
    assert_eq!(stats.failed_shards().count(), 1);
    assert_eq!(stats.totals().written, 3);

    let sink = dir.path().join("results.jsonl");
    let lines = std::fs::read_to_string(sink).unwrap();
    assert_eq!(lines.lines().count(), 3);
}

#[tokio::test]
async fn test_stop_signal_prevents_fetching() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(html(result_page(vec![listing("A", "/d/1")], None)))
        .expect(0)
        .mount(&server)
        .await;

    let stop = StopSignal::new();
    stop.stop();
    let coordinator = coordinator(create_test_config(&server, dir.path())).with_stop_signal(stop);
    let report = coordinator.run_shard(&SearchQuery::new("stop"), None).await;

    assert_eq!(report.termination, Some(Termination::Cancelled));
    assert_eq!(report.pages, 0);
}

#[tokio::test]
async fn test_append_mode_keeps_previous_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(vec![listing("Acme", "/d/1")], None)))
        .mount(&server)
        .await;
    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;

    let mut config = create_test_config(&server, dir.path());
    config.output.mode = WriteMode::Append;

    let first = coordinator(config.clone()).run_shard(&SearchQuery::new("again"), None).await;
    let second = coordinator(config).run_shard(&SearchQuery::new("again"), None).await;

    assert_eq!(first.sink, second.sink);
    assert_eq!(read_records(&second).len(), 2);
}

#[tokio::test]
async fn test_record_budget_does_not_count_skipped_listings() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let bare = json!({"@type": "LocalBusiness", "name": "Bare", "telephone": "040 1"});

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(
            vec![bare, listing("A", "/d/1"), listing("B", "/d/2")],
            Some("/results/2"),
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/results/2"))
        .respond_with(html(result_page(vec![listing("C", "/d/3")], None)))
        .expect(0)
        .mount(&server)
        .await;

    for n in 1..=3 {
        mount_detail(&server, &format!("/d/{}", n), "info@acme.de", "https://acme.de").await;
    }

    let mut config = create_test_config(&server, dir.path());
    config.crawler.max_records = 2;
    let report = coordinator(config).run_shard(&SearchQuery::new("window"), None).await;

    assert_eq!(report.termination, Some(Termination::RecordBudget));
    assert_eq!(report.pages, 1);
    assert_eq!(report.listings.skipped, 1);

    let mut names: Vec<String> = read_records(&report)
        .into_iter()
        .filter_map(|r| r.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn test_undecodable_listing_is_counted_as_skipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let broken = json!({"@type": "LocalBusiness", "name": ["not", "a", "name"], "url": "/d/9"});

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(result_page(vec![broken, listing("Acme", "/d/1")], None)))
        .mount(&server)
        .await;
    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;

    let report = coordinator(create_test_config(&server, dir.path()))
        .run_shard(&SearchQuery::new("broken"), None)
        .await;

    assert_eq!(report.listings.skipped, 1);
    assert_eq!(report.listings.written, 1);
}

#[tokio::test]
async fn test_relative_detail_reference_resolves_against_site_origin() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/branchen/suche"))
        .respond_with(html(result_page(vec![listing("Acme", "d/1")], None)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/d/1"))
        .respond_with(html(detail_page("info@acme.de", "https://acme.de")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, dir.path());
    config.site.search_path = "/branchen/suche".to_string();
    let report = coordinator(config).run_shard(&SearchQuery::new("origin"), None).await;

    assert_eq!(report.listings.written, 1);
    assert_eq!(read_records(&report)[0].mail_address, "info@acme.de");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_sink_failure_aborts_only_its_shard() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("ci", "11111"))
        .respond_with(html(result_page(vec![listing("Lost", "/d/1")], Some("/results/2"))))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/results/2"))
        .respond_with(html(result_page(vec![listing("Never", "/d/2")], None)))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("ci", "22041"))
        .respond_with(html(result_page(vec![listing("Kept", "/d/1")], None)))
        .mount(&server)
        .await;

    mount_detail(&server, "/d/1", "info@acme.de", "https://acme.de").await;

    // the first shard's sink cannot take any bytes
    std::os::unix::fs::symlink("/dev/full", dir.path().join("disk_11111.jsonl")).unwrap();

    let mut config = create_test_config(&server, dir.path());
    config.output.mode = WriteMode::Append;
    let shards = vec!["11111".to_string(), "22041".to_string()];
    let stats = coordinator(config).run_query(&SearchQuery::new("disk"), &shards).await;

    assert_eq!(stats.shards.len(), 2);
    assert!(stats.shards[0].error.is_some());
    assert_eq!(stats.shards[0].termination, None);
    assert!(stats.shards[1].error.is_none());
    assert_eq!(stats.shards[1].termination, Some(Termination::Exhausted));

    let records = read_records(&stats.shards[1]);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_deref(), Some("Kept"));
}
