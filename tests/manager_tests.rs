//! Integration tests for the indexer manager: fan-out, caching and loading

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use common::*;
use indexarr::config::IndexerFile;
use indexarr::indexer::{HttpResponse, IndexerError, IndexerManager, SearchCriteria, SystemClock};

fn manager_with_sites() -> (IndexerManager, Arc<FakeHttp>, Arc<FakeHttp>) {
    let good_http = FakeHttp::json(items("good", 1));
    let bad_http = FakeHttp::new(|request, _| {
        if request.form.is_some() {
            return Err(IndexerError::authentication("wrong password"));
        }
        Ok(json_response(&request.url, 200, "[]"))
    });

    let manager = IndexerManager::new(Duration::from_secs(60));
    let good = site_named("alpha", good_http.clone(), Box::new(SiteGenerator::new()), capabilities(), descriptor());
    let bad = site_named("beta", bad_http.clone(), Box::new(SiteGenerator::new()), capabilities(), descriptor());
    manager.add_indexer(Arc::new(good.indexer));
    manager.add_indexer(Arc::new(bad.indexer));
    (manager, good_http, bad_http)
}

#[tokio::test]
async fn test_one_failing_indexer_does_not_hide_the_others() {
    let (manager, _, _) = manager_with_sites();

    let results = manager.search_all(&SearchCriteria::basic("greek")).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].indexer_id, "alpha");
    assert_eq!(results[0].releases.len(), 1);
    assert!(results[0].error.is_none());

    assert_eq!(results[1].indexer_id, "beta");
    assert!(results[1].releases.is_empty());
    let failure = results[1].error.as_ref().unwrap();
    assert_eq!(failure.kind, "authentication");
    assert!(failure.fatal);
    assert!(failure.message.contains("wrong password"));
}

#[tokio::test]
async fn test_repeated_search_is_served_from_cache() {
    let (manager, good_http, _) = manager_with_sites();
    let criteria = SearchCriteria::basic("greek");

    let first = manager.search_indexers(&["alpha".to_string()], &criteria).await;
    let second = manager.search_indexers(&["alpha".to_string()], &criteria).await;

    assert!(!first[0].from_cache);
    assert!(second[0].from_cache);
    assert_eq!(first[0].releases, second[0].releases);
    assert_eq!(good_http.search_requests().len(), 1);

    // different criteria miss the cache
    manager.search_indexers(&["alpha".to_string()], &SearchCriteria::basic("other")).await;
    assert_eq!(good_http.search_requests().len(), 2);
}

#[tokio::test]
async fn test_failed_searches_are_not_cached() {
    let (manager, _, bad_http) = manager_with_sites();
    let criteria = SearchCriteria::basic("greek");

    manager.search_indexers(&["beta".to_string()], &criteria).await;
    let again = manager.search_indexers(&["beta".to_string()], &criteria).await;

    assert!(!again[0].from_cache);
    assert_eq!(bad_http.sent().len(), 2);
}

#[tokio::test]
async fn test_indexers_that_cannot_serve_the_query_are_skipped() {
    let (manager, good_http, bad_http) = manager_with_sites();

    let results = manager.search_all(&SearchCriteria::book("dune")).await;

    assert!(results.is_empty());
    assert!(good_http.sent().is_empty());
    assert!(bad_http.sent().is_empty());
}

#[tokio::test]
async fn test_unload_forgets_indexer() {
    let (manager, _, _) = manager_with_sites();
    manager.unload_indexer("beta");

    assert!(manager.get_indexer("beta").is_none());
    let ids: Vec<_> = manager.get_all_indexers().iter().map(|i| i.id().to_string()).collect();
    assert_eq!(ids, vec!["alpha"]);
}

#[tokio::test]
async fn test_download_goes_through_the_named_indexer() {
    let http = FakeHttp::new(|request, _| {
        Ok(HttpResponse::new(&request.url, 200, "d4:infod4:name1:xee").with_header("content-type", "application/x-bittorrent"))
    });
    let manager = IndexerManager::new(Duration::ZERO);
    let site = site_named("alpha", http.clone(), Box::new(SiteGenerator::new()), capabilities(), descriptor());
    manager.add_indexer(Arc::new(site.indexer));

    let bytes = manager.download("alpha", "https://site.test/dl/1.torrent").await.unwrap();
    assert_eq!(bytes, b"d4:infod4:name1:xee");
    assert_eq!(http.search_requests()[0].url, "https://site.test/dl/1.torrent");

    assert!(manager.download("nope", "https://site.test/dl/1.torrent").await.is_err());
}

#[test]
fn test_load_skips_broken_and_disabled_entries() {
    let file = IndexerFile::parse(
        r#"
indexers:
  - id: csv
    kind: torrentscsv
  - id: nokey
    kind: unit3d
    base_url: https://tracker.test
  - id: off
    kind: torrentscsv
    enabled: false
  - id: mystery
    kind: cardigann
"#,
    )
    .unwrap();

    let manager = IndexerManager::new(Duration::ZERO);
    let loaded = manager.load_indexers(
        &file.indexers,
        FakeHttp::json("[]"),
        Arc::new(SystemClock),
        Duration::from_secs(5),
    );

    assert_eq!(loaded, 1);
    assert!(manager.get_indexer("csv").is_some());
    assert!(manager.get_indexer("nokey").is_none());
    assert!(manager.get_indexer("off").is_none());
}
