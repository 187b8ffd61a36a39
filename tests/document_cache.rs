//! End-to-end document cache tests: cache-first PDF resolution against a
//! mock server, eviction under the size cap, and per-document view
//! positions.

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use papershelf::docs::{DocumentError, DocumentFetcher, DocumentSource};
use papershelf::storage::{Database, ViewPosition};
use papershelf::ConnectivityMonitor;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn no_progress(_: u64, _: Option<u64>) {}

#[tokio::test]
async fn second_open_is_served_from_cache() {
    let server = MockServer::start().await;
    let pdf = b"%PDF-1.7 body".to_vec();
    Mock::given(method("GET"))
        .and(path("/pdf/2401.1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = DocumentFetcher::new(test_db().await, ConnectivityMonitor::new(true));
    let url = format!("{}/pdf/2401.1", server.uri());

    let first = fetcher.resolve("2401.1", Some(&url), no_progress).await.unwrap();
    assert_eq!(first.source, DocumentSource::Network);

    let second = fetcher.resolve("2401.1", Some(&url), no_progress).await.unwrap();
    assert_eq!(second.source, DocumentSource::Cache);
    assert_eq!(second.data, pdf);
}

#[tokio::test]
async fn offline_open_works_only_for_cached_documents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"doc".to_vec()))
        .mount(&server)
        .await;

    let db = test_db().await;
    let connectivity = ConnectivityMonitor::new(true);
    let fetcher = DocumentFetcher::new(db, connectivity.clone());
    let url = format!("{}/pdf/a", server.uri());
    fetcher.resolve("a", Some(&url), no_progress).await.unwrap();

    connectivity.set_online(false);

    let cached = fetcher.resolve("a", Some(&url), no_progress).await.unwrap();
    assert_eq!(cached.source, DocumentSource::Cache);

    match fetcher.resolve("b", Some(&url), no_progress).await.unwrap_err() {
        DocumentError::Offline => {}
        e => panic!("Expected Offline, got {e:?}"),
    }
}

#[tokio::test]
async fn failed_download_leaves_no_partial_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = DocumentFetcher::new(test_db().await, ConnectivityMonitor::new(true));
    let url = format!("{}/pdf/x", server.uri());

    assert!(fetcher.resolve("x", Some(&url), no_progress).await.is_err());
    assert!(!fetcher.is_available_offline("x").await.unwrap());

    let stats = fetcher.cache_stats().await.unwrap();
    assert_eq!(stats.total_entries, 0);
    assert_eq!(stats.total_size_bytes, 0);
}

#[tokio::test]
async fn cache_stays_under_the_configured_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pdf/new"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 400]))
        .mount(&server)
        .await;

    let db = test_db().await;
    db.put_document("old-1", &[0u8; 400], 1_000).await.unwrap();
    db.put_document("old-2", &[0u8; 400], 2_000).await.unwrap();

    let fetcher =
        DocumentFetcher::new(db, ConnectivityMonitor::new(true)).with_cache_cap(1_000);
    let url = format!("{}/pdf/new", server.uri());
    fetcher.resolve("new", Some(&url), no_progress).await.unwrap();

    // 1200 bytes > 1000 cap: the oldest entry went, the rest fit.
    assert!(!fetcher.is_available_offline("old-1").await.unwrap());
    assert!(fetcher.is_available_offline("old-2").await.unwrap());
    assert!(fetcher.is_available_offline("new").await.unwrap());

    let stats = fetcher.cache_stats().await.unwrap();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.total_size_bytes, 800);
}

#[tokio::test]
async fn explicit_evict_frees_the_entry() {
    let db = test_db().await;
    db.put_document("p", b"data", 100).await.unwrap();

    let fetcher = DocumentFetcher::new(db, ConnectivityMonitor::new(true));
    fetcher.evict("p").await.unwrap();
    assert!(!fetcher.is_available_offline("p").await.unwrap());
    // Evicting again is fine.
    fetcher.evict("p").await.unwrap();
}

// ============================================================================
// View Positions
// ============================================================================

#[tokio::test]
async fn view_position_round_trips_independently_of_the_document() {
    let db = test_db().await;

    assert!(db.get_view_position("2401.1").await.unwrap().is_none());

    let pos = ViewPosition {
        scroll_offset: 1234.5,
        page: 7,
        zoom: 1.25,
    };
    db.save_view_position("2401.1", &pos, 1_700_000_000).await.unwrap();

    let loaded = db.get_view_position("2401.1").await.unwrap().unwrap();
    assert_eq!(loaded, pos);

    // Evicting the document does not lose the reading position.
    db.delete_document("2401.1").await.unwrap();
    assert!(db.get_view_position("2401.1").await.unwrap().is_some());
}

#[tokio::test]
async fn view_position_updates_replace_the_previous_one() {
    let db = test_db().await;
    let first = ViewPosition {
        scroll_offset: 10.0,
        page: 1,
        zoom: 1.0,
    };
    let second = ViewPosition {
        scroll_offset: 900.0,
        page: 12,
        zoom: 1.5,
    };
    db.save_view_position("p", &first, 100).await.unwrap();
    db.save_view_position("p", &second, 200).await.unwrap();

    let loaded = db.get_view_position("p").await.unwrap().unwrap();
    assert_eq!(loaded, second);
}
