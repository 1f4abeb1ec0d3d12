//! End-to-end tests of the node service over a real store and the channel
//! client talking to a fake engine.

mod common;

use catalog_search::models::{IngestRequest, SearchRequest};
use catalog_search::{
    CatalogDocument, IndexChannelClient, NodeService, QueryMode, RecentErrorLog, SearchIndex,
    SqliteStore,
};
use common::FakeEngine;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    engine: FakeEngine,
    node: NodeService,
    _dir: TempDir,
}

async fn harness(docs: Vec<CatalogDocument>) -> Harness {
    let engine = FakeEngine::start().await;
    harness_with(engine, docs, QueryMode::PerTerm).await
}

async fn harness_with(engine: FakeEngine, docs: Vec<CatalogDocument>, mode: QueryMode) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("catalog.db")).unwrap();
    store.insert_many(docs).await.unwrap();

    let errors = Arc::new(RecentErrorLog::default());
    let client = Arc::new(IndexChannelClient::new(
        "node-it",
        engine.settings(),
        Arc::clone(&errors),
    ));
    client.connect(None).await.unwrap();

    let node = NodeService::new(
        "node-it",
        client as Arc<dyn SearchIndex>,
        Arc::new(store),
        errors,
    )
    .with_query_mode(mode);
    Harness {
        engine,
        node,
        _dir: dir,
    }
}

fn chairs() -> Vec<CatalogDocument> {
    vec![
        CatalogDocument::new("A", "red chair", "").with_price(40.0),
        CatalogDocument::new("B", "blue chair", "").with_price(55.0),
    ]
}

fn ids(items: &[CatalogDocument]) -> Vec<&str> {
    items.iter().map(|d| d.id.as_str()).collect()
}

#[tokio::test]
async fn test_reload_then_search() {
    let h = harness(chairs()).await;

    let report = h.node.reload_index().await.unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);

    let red = h
        .node
        .search_and_fetch_items(SearchRequest::new("red", 10))
        .await;
    assert_eq!(ids(&red.items), vec!["A"]);
    assert_eq!(red.items[0].price, 40.0);

    let chair = h
        .node
        .search_and_fetch_items(SearchRequest::new("chair", 10))
        .await;
    assert_eq!(ids(&chair.items), vec!["A", "B"]);

    let both = h
        .node
        .search_and_fetch_items(SearchRequest::new("red blue", 10))
        .await;
    assert_eq!(ids(&both.items), vec!["A", "B"]);

    let none = h
        .node
        .search_and_fetch_items(SearchRequest::new("green", 10))
        .await;
    assert!(none.items.is_empty());
}

#[tokio::test]
async fn test_phrase_mode_requires_all_terms() {
    let h = harness_with(FakeEngine::start().await, chairs(), QueryMode::Phrase).await;
    h.node.reload_index().await.unwrap();

    let found = h
        .node
        .search_and_fetch_items(SearchRequest::new("red chair", 10))
        .await;
    assert_eq!(ids(&found.items), vec!["A"]);
    let found = h
        .node
        .search_and_fetch_items(SearchRequest::new("red blue", 10))
        .await;
    assert!(found.items.is_empty());
}

#[tokio::test]
async fn test_reload_drops_stale_entries() {
    let engine = FakeEngine::start().await;
    engine.seed("items", "search", "gone", "red relic");
    let h = harness_with(engine, chairs(), QueryMode::PerTerm).await;

    h.node.reload_index().await.unwrap();

    let red = h
        .node
        .search_and_fetch_items(SearchRequest::new("red", 10))
        .await;
    assert_eq!(ids(&red.items), vec!["A"]);
    assert!(h.engine.text_of("gone").is_empty());
}

#[tokio::test]
async fn test_repeated_reload_does_not_duplicate_text() {
    let h = harness(chairs()).await;

    h.node.reload_index().await.unwrap();
    h.node.reload_index().await.unwrap();

    assert_eq!(h.engine.text_of("A"), vec!["red", "chair"]);
}

#[tokio::test]
async fn test_ingest_range_counts_failures() {
    let docs: Vec<CatalogDocument> = (1..=10)
        .map(|i| CatalogDocument::new(format!("item-{}", i), format!("thing {}", i), ""))
        .collect();
    let engine = FakeEngine::start().await;
    engine.fail_push_for("item-3");
    let h = harness_with(engine, docs, QueryMode::PerTerm).await;

    let response = h.node.ingest_data(IngestRequest::full_range()).await;
    assert!(response.success);
    assert_eq!(response.ingested_count, 9);
    assert_eq!(response.message, "Ingested 9 items. Errors: 1. Skipped: 0");

    let status = h.node.get_status().await;
    assert_eq!(status.indexed_count, 10);
    assert!(status
        .recent_errors
        .iter()
        .any(|e| e.contains("Ingest error for item-3")));
}

#[tokio::test]
async fn test_ingest_empty_range() {
    let h = harness(chairs()).await;

    let response = h
        .node
        .ingest_data(IngestRequest {
            start_index: 50,
            limit: 10,
            category_filter: String::new(),
        })
        .await;
    assert!(response.success);
    assert_eq!(response.ingested_count, 0);
    assert_eq!(
        response.message,
        "No new items found to ingest for this range."
    );
}

#[tokio::test]
async fn test_blank_query_returns_nothing() {
    let h = harness(chairs()).await;
    h.node.reload_index().await.unwrap();

    let found = h
        .node
        .search_and_fetch_items(SearchRequest::new("   ", 10))
        .await;
    assert!(found.items.is_empty());
    assert!(!h.engine.commands().iter().any(|c| c == "QUERY"));
}

#[tokio::test]
async fn test_lost_engine_degrades_search() {
    let h = harness(chairs()).await;
    h.node.reload_index().await.unwrap();

    h.engine.shutdown();
    let found = h
        .node
        .search_and_fetch_items(SearchRequest::new("chair", 10))
        .await;
    assert!(found.items.is_empty());

    let status = h.node.get_status().await;
    assert!(!status.search_connected);
    assert_eq!(status.indexed_count, 2);
    assert!(!status.recent_errors.is_empty());
}
