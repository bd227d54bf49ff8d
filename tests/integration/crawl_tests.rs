//! Integration tests for the crawler
//!
//! The scenario tests drive a real `Crawler` with an in-process fetcher and a
//! recording storage backend. The HTTP tests use wiremock to create mock
//! servers and exercise `HttpFetcher` and a full crawl into SQLite.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use webcrawler::config::{CrawlerConfig, UserAgentConfig};
use webcrawler::crawler::{CrawlSummary, Crawler, FetchError, Fetcher, HttpFetcher, StopReason};
use webcrawler::storage::{open_connections, SqliteStorage, Storage, StorageError, StorageResult};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ===== Test doubles =====

/// Serves pages from a map and counts every fetch per URL
struct StubFetcher {
    pages: HashMap<String, String>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
    fn with_pages(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            fetches: Mutex::new(HashMap::new()),
        }
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        *self.fetches.lock().entry(url.to_string()).or_insert(0) += 1;
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Connect {
            url: url.to_string(),
            reason: "unreachable".to_string(),
        })
    }
}

#[derive(Default)]
struct Recorded {
    content: HashMap<String, String>,
    links: Vec<(String, String)>,
}

/// Storage connection writing into shared memory
#[derive(Clone, Default)]
struct RecordingStorage(Arc<Mutex<Recorded>>);

impl Storage for RecordingStorage {
    fn insert_content(&mut self, url: &str, content: &str) -> StorageResult<()> {
        let mut recorded = self.0.lock();
        if recorded.content.contains_key(url) {
            return Err(StorageError::DuplicateKey(url.to_string()));
        }
        recorded.content.insert(url.to_string(), content.to_string());
        Ok(())
    }

    fn insert_link(&mut self, from_url: &str, to_url: &str) -> StorageResult<()> {
        let mut recorded = self.0.lock();
        let edge = (from_url.to_string(), to_url.to_string());
        if recorded.links.contains(&edge) {
            return Err(StorageError::DuplicateKey(format!("{} -> {}", from_url, to_url)));
        }
        recorded.links.push(edge);
        Ok(())
    }
}

fn run_stub_crawl(
    pages: &[(&str, &str)],
    seed: &str,
    workers: u32,
) -> (CrawlSummary, Arc<StubFetcher>, RecordingStorage) {
    let fetcher = Arc::new(StubFetcher::with_pages(pages));
    let storage = RecordingStorage::default();
    let config = CrawlerConfig::new(seed, workers);
    let connections = vec![storage.clone(); config.connection_count()];

    let crawler = Crawler::new(&config, Arc::clone(&fetcher), connections)
        .expect("Failed to create crawler");
    let summary = crawler.start(seed).expect("Crawl failed");
    (summary, fetcher, storage)
}

fn test_user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

// ===== Crawl scenarios =====

#[test]
fn test_bootstrap_records_seed_and_edges() {
    let (summary, fetcher, storage) = run_stub_crawl(
        &[
            ("http://a.test/", r#"<a href="/b">B</a><a href="/c">C</a>"#),
            ("http://a.test/b", "<p>b</p>"),
            ("http://a.test/c", "<p>c</p>"),
        ],
        "http://a.test/",
        2,
    );

    let recorded = storage.0.lock();
    assert!(recorded.content.contains_key("http://a.test/"));
    assert_eq!(recorded.content.len(), 3);
    assert_eq!(
        recorded.links,
        vec![
            ("http://a.test/".to_string(), "http://a.test/b".to_string()),
            ("http://a.test/".to_string(), "http://a.test/c".to_string()),
        ]
    );

    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.urls_seen, 3);
    assert_eq!(summary.stats.links_enqueued, 2);
    assert_eq!(fetcher.fetches.lock().len(), 3);
}

#[test]
fn test_failed_fetch_leaves_no_trace() {
    let (summary, fetcher, storage) = run_stub_crawl(&[], "http://down.test/", 2);

    let recorded = storage.0.lock();
    assert!(recorded.content.is_empty());
    assert!(recorded.links.is_empty());
    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.stats.fetch_failures, 1);
    assert_eq!(summary.urls_seen, 1);
    // No retry.
    assert_eq!(fetcher.fetches.lock().get("http://down.test/"), Some(&1));
}

#[test]
fn test_failed_child_fetch_keeps_its_edge() {
    let (summary, _fetcher, storage) = run_stub_crawl(
        &[("http://a.test/", r#"<a href="/gone">gone</a>"#)],
        "http://a.test/",
        1,
    );

    let recorded = storage.0.lock();
    assert_eq!(recorded.links.len(), 1);
    assert!(!recorded.content.contains_key("http://a.test/gone"));
    assert_eq!(summary.stats.fetch_failures, 1);
}

#[test]
fn test_revisit_suppression() {
    let (summary, fetcher, storage) = run_stub_crawl(
        &[
            ("http://a.test/", r#"<a href="http://b.test/">B</a>"#),
            ("http://b.test/", r#"<a href="http://a.test/">A</a><a href="http://a.test/#top">A again</a>"#),
        ],
        "http://a.test/",
        4,
    );

    let fetches = fetcher.fetches.lock();
    assert_eq!(fetches.get("http://a.test/"), Some(&1));
    assert_eq!(fetches.get("http://b.test/"), Some(&1));

    // The back link to an already-seen page is not recorded.
    let recorded = storage.0.lock();
    assert_eq!(
        recorded.links,
        vec![("http://a.test/".to_string(), "http://b.test/".to_string())]
    );
    assert_eq!(summary.urls_seen, 2);
}

#[test]
fn test_oversized_url_is_ignored() {
    let long = format!("http://a.test/{}", "x".repeat(600));
    let seed_page = format!(r#"<a href="{}">long</a><a href="/short">short</a>"#, long);
    let (summary, fetcher, storage) = run_stub_crawl(
        &[
            ("http://a.test/", seed_page.as_str()),
            ("http://a.test/short", "<p>short</p>"),
        ],
        "http://a.test/",
        2,
    );

    assert!(fetcher.fetches.lock().get(&long).is_none());
    let recorded = storage.0.lock();
    assert!(recorded.links.iter().all(|(_, to)| to != &long));
    assert_eq!(recorded.links.len(), 1);
    assert_eq!(summary.urls_seen, 2);
    assert_eq!(summary.stats.links_discovered, 2);
}

#[test]
fn test_large_site_crawled_exactly_once() {
    // A ring of pages where every page also links back to the index.
    let count = 60;
    let index: String = (0..count)
        .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
        .collect();
    let mut bodies = vec![("http://a.test/".to_string(), index)];
    for i in 0..count {
        bodies.push((
            format!("http://a.test/p{}", i),
            format!(r#"<a href="/">home</a><a href="/p{}">next</a>"#, (i + 1) % count),
        ));
    }
    let pages: Vec<(&str, &str)> = bodies
        .iter()
        .map(|(url, body)| (url.as_str(), body.as_str()))
        .collect();

    let (summary, fetcher, storage) = run_stub_crawl(&pages, "http://a.test/", 8);

    let fetches = fetcher.fetches.lock();
    assert_eq!(fetches.len(), count + 1);
    assert!(fetches.values().all(|&n| n == 1));
    assert_eq!(storage.0.lock().content.len(), count + 1);
    assert_eq!(summary.stats.dispatched, (count + 1) as u64);
    assert_eq!(summary.urls_pending, 0);
}

/// Blocks each child fetch until `target` fetches are in flight at once
struct ConcurrencyProbe {
    in_flight: Mutex<usize>,
    arrived: Condvar,
    target: usize,
    peak: AtomicUsize,
}

impl Fetcher for ConcurrencyProbe {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if url == "http://a.test/" {
            let links: String = (0..self.target)
                .map(|i| format!(r#"<a href="/p{}">p</a>"#, i))
                .collect();
            return Ok(links);
        }

        let mut in_flight = self.in_flight.lock();
        *in_flight += 1;
        self.peak.fetch_max(*in_flight, Ordering::SeqCst);
        self.arrived.notify_all();

        let deadline = Instant::now() + Duration::from_secs(5);
        while *in_flight < self.target && Instant::now() < deadline {
            self.arrived.wait_until(&mut in_flight, deadline);
        }
        Ok(String::new())
    }
}

#[test]
fn test_dispatch_fills_every_idle_worker() {
    let workers = 4;
    let probe = Arc::new(ConcurrencyProbe {
        in_flight: Mutex::new(0),
        arrived: Condvar::new(),
        target: workers,
        peak: AtomicUsize::new(0),
    });

    let config = CrawlerConfig::new("http://a.test/", workers as u32);
    let storage = RecordingStorage::default();
    let crawler = Crawler::new(
        &config,
        Arc::clone(&probe),
        vec![storage; config.connection_count()],
    )
    .unwrap();

    let started = Instant::now();
    let summary = crawler.start("http://a.test/").unwrap();

    assert_eq!(probe.peak.load(Ordering::SeqCst), workers);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.stats.dispatched, (workers + 1) as u64);
}

#[test]
fn test_stop_from_another_thread() {
    // An endless site: every page links to the next one.
    struct EndlessFetcher;

    impl Fetcher for EndlessFetcher {
        fn fetch(&self, url: &str) -> Result<String, FetchError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(format!(r#"<a href="{}/n">next</a>"#, url.trim_end_matches('/')))
        }
    }

    let config = CrawlerConfig::new("http://a.test/", 2);
    let crawler = Crawler::new(
        &config,
        EndlessFetcher,
        vec![RecordingStorage::default(); config.connection_count()],
    )
    .unwrap();
    let handle = crawler.stop_handle();

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        handle.stop();
    });

    let summary = crawler.start("http://a.test/").unwrap();
    stopper.join().unwrap();

    assert_eq!(summary.stop_reason, StopReason::Requested);
    assert!(summary.stats.fetched >= 1);
}

// ===== HTTP fetcher =====

#[tokio::test(flavor = "multi_thread")]
async fn test_http_fetcher_success_and_user_agent() {
    let mock_server = MockServer::start().await;
    let expected_agent = test_user_agent().header_value();

    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", expected_agent.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/page", mock_server.uri());
    let body = tokio::task::spawn_blocking(move || {
        HttpFetcher::new(&test_user_agent()).unwrap().fetch(&url)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(body, "<p>hello</p>");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_fetcher_status_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let base = mock_server.uri();
    let (missing, broken) = tokio::task::spawn_blocking(move || {
        let fetcher = HttpFetcher::new(&test_user_agent()).unwrap();
        (
            fetcher.fetch(&format!("{}/missing", base)),
            fetcher.fetch(&format!("{}/broken", base)),
        )
    })
    .await
    .unwrap();

    assert!(matches!(missing, Err(FetchError::Status { status: 404, .. })));
    assert!(matches!(broken, Err(FetchError::Status { status: 500, .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_fetcher_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let url = format!("{}/slow", mock_server.uri());
    let result = tokio::task::spawn_blocking(move || {
        HttpFetcher::with_timeout(&test_user_agent(), Duration::from_millis(200))
            .unwrap()
            .fetch(&url)
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(FetchError::Timeout { .. })));
}

// ===== Full crawl =====

#[tokio::test(flavor = "multi_thread")]
async fn test_full_crawl_into_sqlite() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                <a href="/page1">Page 1</a>
                <a href="/page2">Page 2</a>
                <a href="/dead">Dead</a>
                <a href="mailto:someone@example.com">Mail</a>
            </body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<html><body><a href="/">Home</a><a href="/page2">2</a></body></html>"#),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Content 2</body></html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dead"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("crawl.db");
    let seed = format!("{}/", mock_server.uri());

    let crawl_db = db_path.clone();
    let crawl_seed = seed.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let mut config = CrawlerConfig::new(crawl_seed.as_str(), 3);
        config.connections = Some(2);
        let connections = open_connections(&crawl_db, config.connection_count()).unwrap();
        let fetcher = HttpFetcher::new(&test_user_agent()).unwrap();
        let crawler = Crawler::new(&config, fetcher, connections).unwrap();
        crawler.start(&crawl_seed).unwrap()
    })
    .await
    .unwrap();

    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.stats.fetched, 3);
    assert_eq!(summary.stats.fetch_failures, 1);
    assert_eq!(summary.urls_seen, 4);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_pages().unwrap(), 3);
    assert_eq!(storage.count_hosts().unwrap(), 1);
    assert_eq!(storage.count_links().unwrap(), 3);

    let mut outgoing = storage.get_outgoing_links(&seed).unwrap();
    outgoing.sort();
    assert_eq!(
        outgoing,
        vec![
            format!("{}dead", seed),
            format!("{}page1", seed),
            format!("{}page2", seed),
        ]
    );

    let home = storage.get_content(&seed).unwrap().unwrap();
    assert!(home.content.contains("Page 1"));
    assert!(storage.get_content(&format!("{}dead", seed)).unwrap().is_none());
}
