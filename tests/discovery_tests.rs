//! End-to-end tests for discovery jobs
//!
//! Each test runs a real job against a wiremock server standing in for the
//! target site, with an in-memory database and cache.

use skeleton_discovery::cache::{
    CacheError, CacheResult, DiscoverySnapshot, MemorySnapshotCache, SnapshotCache,
};
use skeleton_discovery::config::{load_config, Config};
use skeleton_discovery::discovery::{Coordinator, RetryPolicy};
use skeleton_discovery::queue::{JobOutcome, JobRequest, Worker};
use skeleton_discovery::storage::{DiscoveredPage, NewDiscovery, SqliteStorage, Storage};
use skeleton_discovery::{DiscoveryError, DiscoveryStatus, ExecutionMode, PageSource};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG: &str = r#"
[fetch]
allow-private-hosts = true
sitemap-timeout-ms = 300

[rate-limit]
request-delay-ms = 0

[retry]
max-attempts = 2
initial-backoff-ms = 10

[worker]
poll-interval-ms = 10

[user-agent]
crawler-name = "SkeletonBot"
crawler-version = "1.0"
contact-url = "https://example.com/bot"
contact-email = "bot@example.com"

[output]
database-path = ":memory:"
"#;

fn load_test_config() -> Config {
    config_from(CONFIG)
}

fn config_from(toml: &str) -> Config {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    load_config(file.path()).unwrap()
}

struct Harness {
    server: MockServer,
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
    cache: Arc<MemorySnapshotCache>,
    coordinator: Coordinator,
}

impl Harness {
    async fn start() -> Self {
        Self::with_storage(SqliteStorage::open_in_memory().unwrap()).await
    }

    async fn with_storage(storage: SqliteStorage) -> Self {
        Self::with_parts(load_test_config(), storage).await
    }

    async fn with_parts(config: Config, storage: SqliteStorage) -> Self {
        let server = MockServer::start().await;
        let config = Arc::new(config);
        let storage = Arc::new(Mutex::new(storage));
        let cache = Arc::new(MemorySnapshotCache::with_ttl_hours(24));
        let coordinator =
            Coordinator::new(Arc::clone(&config), Arc::clone(&storage), cache.clone()).unwrap();

        Self {
            server,
            config,
            storage,
            cache,
            coordinator,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    fn homepage(&self) -> String {
        self.url("/")
    }

    fn create_discovery(&self, max_pages: u32, max_depth: u32) -> JobRequest {
        let mut storage = self.storage.lock().unwrap();
        let discovery = storage
            .create_discovery(&NewDiscovery {
                homepage_url: self.homepage(),
                mode: ExecutionMode::Auto,
                max_pages,
                max_depth,
                session_id: Some("session-1".to_string()),
            })
            .unwrap();
        JobRequest::from_discovery(&discovery)
    }

    fn pages(&self, id: &str) -> Vec<DiscoveredPage> {
        self.storage.lock().unwrap().get_pages(id).unwrap()
    }

    fn status(&self, id: &str) -> DiscoveryStatus {
        self.storage
            .lock()
            .unwrap()
            .find_discovery(id)
            .unwrap()
            .unwrap()
            .status
    }

    async fn mount_homepage(&self, html: String) {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(html)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&self.server)
            .await;
    }

    async fn mount_xml(&self, at: &str, xml: String) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(xml)
                    .insert_header("content-type", "application/xml"),
            )
            .mount(&self.server)
            .await;
    }
}

fn urlset(urls: &[String]) -> String {
    let entries: String = urls
        .iter()
        .map(|u| format!("<url><loc>{}</loc></url>", u))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{}</urlset>"#,
        entries
    )
}

fn nav_page(title: &str, links: &[(&str, &str)]) -> String {
    let anchors: String = links
        .iter()
        .map(|(href, text)| format!(r#"<a href="{}">{}</a>"#, href, text))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><nav>{}</nav><main>Hello</main></body></html>",
        title, anchors
    )
}

fn first_attempt() -> skeleton_discovery::discovery::Attempt {
    RetryPolicy::default().first_attempt()
}

fn final_attempt() -> skeleton_discovery::discovery::Attempt {
    RetryPolicy::default().attempt(3)
}

#[tokio::test]
async fn test_navigation_links_become_pages() {
    let h = Harness::start().await;
    h.mount_homepage(nav_page(
        "Acme",
        &[
            ("/about", "About"),
            ("/services", "Services"),
            ("/contact", "Contact"),
            ("https://external.example.org/partner", "Partner"),
        ],
    ))
    .await;

    let request = h.create_discovery(10, 1);
    let result = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();

    assert_eq!(result.status, DiscoveryStatus::Completed);
    assert!(!result.partial_results);
    assert_eq!(result.page_count, 3);

    let pages = h.pages(&request.discovery_id);
    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![h.url("/about"), h.url("/services"), h.url("/contact")]
    );
    assert!(pages
        .iter()
        .all(|p| p.source == PageSource::Navigation && p.depth == 1));
    assert_eq!(pages[0].title.as_deref(), Some("About"));
}

#[tokio::test]
async fn test_max_pages_keeps_sitemap_pages_first() {
    let h = Harness::start().await;
    let sitemap_urls: Vec<String> = (1..=5).map(|i| h.url(&format!("/s{}", i))).collect();
    h.mount_xml("/sitemap.xml", urlset(&sitemap_urls)).await;
    h.mount_homepage(nav_page(
        "Acme",
        &[("/n1", "One"), ("/n2", "Two"), ("/n3", "Three")],
    ))
    .await;

    let request = h.create_discovery(2, 1);
    let result = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();
    assert_eq!(result.page_count, 2);

    let pages = h.pages(&request.discovery_id);
    assert_eq!(pages.len(), 2);
    assert!(pages
        .iter()
        .all(|p| p.source == PageSource::Sitemap && p.depth == 0));
    assert_eq!(pages[0].url, h.url("/s1"));
    assert_eq!(pages[1].url, h.url("/s2"));
}

#[tokio::test]
async fn test_sitemap_timeout_yields_partial_results() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/sitemap.*\.xml$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(urlset(&[h.url("/never")]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&h.server)
        .await;
    h.mount_homepage(nav_page("Acme", &[("/about", "About"), ("/team", "Team")]))
        .await;

    let request = h.create_discovery(10, 1);
    let result = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();

    assert_eq!(result.status, DiscoveryStatus::Completed);
    assert!(result.partial_results);

    let pages = h.pages(&request.discovery_id);
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().all(|p| p.source == PageSource::Navigation));
}

#[tokio::test]
async fn test_empty_site_falls_back_to_homepage() {
    let h = Harness::start().await;
    h.mount_xml("/sitemap.xml", urlset(&[])).await;
    h.mount_homepage(
        "<html><head><title>Example Home</title></head><body><p>No menu</p></body></html>"
            .to_string(),
    )
    .await;

    let request = h.create_discovery(10, 1);
    let result = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();

    assert_eq!(result.status, DiscoveryStatus::Completed);
    assert!(!result.partial_results);

    let pages = h.pages(&request.discovery_id);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].url, h.homepage());
    assert_eq!(pages[0].depth, 0);
    assert_eq!(pages[0].title.as_deref(), Some("Example Home"));
}

#[tokio::test]
async fn test_sitemap_wins_over_navigation() {
    let h = Harness::start().await;
    h.mount_xml("/sitemap.xml", urlset(&[h.url("/about")])).await;
    h.mount_homepage(nav_page("Acme", &[("/about/", "About Us")]))
        .await;

    let request = h.create_discovery(10, 1);
    h.coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();

    let pages = h.pages(&request.discovery_id);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].source, PageSource::Sitemap);
    assert_eq!(pages[0].depth, 0);
    assert_eq!(pages[0].title.as_deref(), Some("About Us"));
}

#[tokio::test]
async fn test_sitemap_index_and_robots_rules() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "User-agent: *\nDisallow: /private\n\nSitemap: {}\n",
            h.url("/custom-index.xml")
        )))
        .mount(&h.server)
        .await;
    h.mount_xml(
        "/custom-index.xml",
        format!(
            r#"<?xml version="1.0"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>{}</loc></sitemap>
</sitemapindex>"#,
            h.url("/pages.xml")
        ),
    )
    .await;
    h.mount_xml(
        "/pages.xml",
        urlset(&[h.url("/blog"), h.url("/private/admin"), h.url("/pricing")]),
    )
    .await;
    h.mount_homepage(nav_page(
        "Acme",
        &[("/private/secret", "Secret"), ("/docs", "Docs")],
    ))
    .await;

    let request = h.create_discovery(10, 1);
    h.coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();

    let pages = h.pages(&request.discovery_id);
    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec![h.url("/blog"), h.url("/pricing"), h.url("/docs")]);
}

#[tokio::test]
async fn test_result_is_cached() {
    let h = Harness::start().await;
    h.mount_homepage(nav_page("Acme", &[("/about", "About")])).await;

    let request = h.create_discovery(10, 1);
    h.coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();

    let snapshot = h.cache.get(&request.discovery_id).unwrap().unwrap();
    assert_eq!(snapshot.discovery.status, DiscoveryStatus::Completed);
    assert_eq!(snapshot.pages.len(), 1);
}

struct BrokenCache;

impl SnapshotCache for BrokenCache {
    fn put(&self, _snapshot: &DiscoverySnapshot) -> CacheResult<()> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    fn get(&self, _discovery_id: &str) -> CacheResult<Option<DiscoverySnapshot>> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    fn invalidate(&self, _discovery_id: &str) -> CacheResult<()> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_cache_failure_does_not_fail_job() {
    let h = Harness::start().await;
    h.mount_homepage(nav_page("Acme", &[("/about", "About")])).await;
    let coordinator = Coordinator::new(
        Arc::clone(&h.config),
        Arc::clone(&h.storage),
        Arc::new(BrokenCache),
    )
    .unwrap();

    let request = h.create_discovery(10, 1);
    let result = coordinator.run_job(&request, first_attempt()).await.unwrap();
    assert_eq!(result.status, DiscoveryStatus::Completed);
}

#[tokio::test]
async fn test_missing_discovery_is_not_found() {
    let h = Harness::start().await;
    let request = JobRequest {
        discovery_id: "does-not-exist".to_string(),
        homepage_url: h.homepage(),
        mode: ExecutionMode::Auto,
        session_id: None,
        max_pages: 10,
        max_depth: 1,
    };

    let err = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::NotFound(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_cancelled_discovery_is_skipped() {
    let h = Harness::start().await;
    let request = h.create_discovery(10, 1);
    h.storage
        .lock()
        .unwrap()
        .update_status(&request.discovery_id, DiscoveryStatus::Cancelled, None)
        .unwrap();

    let result = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();
    assert_eq!(result.status, DiscoveryStatus::Cancelled);
    assert_eq!(result.page_count, 0);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_during_run_reports_cancelled() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(nav_page("Acme", &[("/about", "About")]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&h.server)
        .await;

    let request = h.create_discovery(10, 1);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.storage
            .lock()
            .unwrap()
            .update_status(&request.discovery_id, DiscoveryStatus::Cancelled, None)
            .unwrap();
    };

    let (result, ()) = tokio::join!(h.coordinator.run_job(&request, first_attempt()), cancel);
    let result = result.unwrap();
    assert_eq!(result.status, DiscoveryStatus::Cancelled);
    assert_eq!(result.page_count, 0);
    assert!(!result.partial_results);

    // Navigation found /about, but nothing lands on the cancelled discovery
    assert_eq!(h.status(&request.discovery_id), DiscoveryStatus::Cancelled);
    assert_eq!(h.pages(&request.discovery_id).len(), 0);
    assert!(h.cache.get(&request.discovery_id).unwrap().is_none());
}

#[tokio::test]
async fn test_private_homepage_is_rejected_without_fetching() {
    let strict = config_from(&CONFIG.replace(
        "allow-private-hosts = true",
        "allow-private-hosts = false",
    ));
    let h = Harness::with_parts(strict, SqliteStorage::open_in_memory().unwrap()).await;
    h.mount_homepage(nav_page("Internal", &[("/admin", "Admin")]))
        .await;

    // The mock server listens on 127.0.0.1
    let request = h.create_discovery(10, 1);
    let result = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap();
    assert_eq!(result.status, DiscoveryStatus::Failed);
    assert_eq!(result.page_count, 0);

    let discovery = h
        .storage
        .lock()
        .unwrap()
        .find_discovery(&request.discovery_id)
        .unwrap()
        .unwrap();
    assert_eq!(discovery.error_code.as_deref(), Some("URL_REJECTED"));
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_final_attempt_keeps_pages_collected_before_failure() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("discovery.db");
    let h = Harness::with_storage(SqliteStorage::new(&db_path).unwrap()).await;

    // Storage breaks as soon as the job enters the navigation phase
    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER fail_navigation_phase
             BEFORE UPDATE OF current_phase ON discoveries
             WHEN NEW.current_phase = 'navigation'
             BEGIN SELECT RAISE(ABORT, 'storage unavailable'); END;",
        )
        .unwrap();

    h.mount_xml("/sitemap.xml", urlset(&[h.url("/s1"), h.url("/s2")]))
        .await;
    h.mount_homepage(nav_page("Acme", &[("/about", "About")])).await;

    let request = h.create_discovery(10, 1);

    let err = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::StorageError(_)));
    assert!(err.is_retryable());
    assert_eq!(h.status(&request.discovery_id), DiscoveryStatus::Running);
    assert!(h.pages(&request.discovery_id).is_empty());

    let result = h
        .coordinator
        .run_job(&request, final_attempt())
        .await
        .unwrap();
    assert_eq!(result.status, DiscoveryStatus::Completed);
    assert!(result.partial_results);
    assert_eq!(result.page_count, 2);

    let discovery = h
        .storage
        .lock()
        .unwrap()
        .find_discovery(&request.discovery_id)
        .unwrap()
        .unwrap();
    assert_eq!(discovery.status, DiscoveryStatus::Completed);
    assert!(discovery.partial_results);
    assert_eq!(discovery.current_phase, None);

    let pages = h.pages(&request.discovery_id);
    let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec![h.url("/s1"), h.url("/s2")]);
    assert!(pages.iter().all(|p| p.source == PageSource::Sitemap));
    assert!(h.cache.get(&request.discovery_id).unwrap().is_some());
}

#[tokio::test]
async fn test_all_phases_failed_on_final_attempt() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/sitemap.*\.xml$"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let request = h.create_discovery(10, 1);

    let err = h
        .coordinator
        .run_job(&request, first_attempt())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::AllPhasesFailed));
    assert_eq!(h.status(&request.discovery_id), DiscoveryStatus::Running);

    let result = h
        .coordinator
        .run_job(&request, final_attempt())
        .await
        .unwrap();
    assert_eq!(result.status, DiscoveryStatus::Failed);

    let discovery = h
        .storage
        .lock()
        .unwrap()
        .find_discovery(&request.discovery_id)
        .unwrap()
        .unwrap();
    assert_eq!(discovery.status, DiscoveryStatus::Failed);
    assert_eq!(discovery.error_code.as_deref(), Some("ALL_PHASES_FAILED"));
    assert!(discovery.error_message.is_some());
    assert!(discovery.completed_at.is_some());
    assert!(h.cache.get(&request.discovery_id).unwrap().is_none());
}

#[tokio::test]
async fn test_worker_runs_queued_discovery() {
    let h = Harness::start().await;
    h.mount_homepage(nav_page("Acme", &[("/about", "About"), ("/blog", "Blog")]))
        .await;
    let worker = Worker::new(&h.config, h.coordinator);

    let request = worker
        .request_discovery(&NewDiscovery {
            homepage_url: h.server.uri(),
            mode: ExecutionMode::Manual,
            max_pages: 10,
            max_depth: 1,
            session_id: None,
        })
        .unwrap();

    let outcomes = worker.run_until_idle().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        JobOutcome::Finished(result) => {
            assert_eq!(result.discovery_id, request.discovery_id);
            assert_eq!(result.status, DiscoveryStatus::Completed);
            assert_eq!(result.page_count, 2);
        }
        other => panic!("expected finished job, got {:?}", other),
    }
}
