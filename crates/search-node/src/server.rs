//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use catalog_search::config::ServerConfig;
use catalog_search::NodeService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub node: Arc<NodeService>,
}

/// Build the node service router.
pub fn router(node: Arc<NodeService>) -> Router {
    let state = Arc::new(AppState { node });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(ConcurrencyLimitLayer::new(ServerConfig::MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    node: Arc<NodeService>,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let node_id = node.node_id().to_string();
    let app = router(node);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!(node_id = %node_id, "Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(node_id = %node_id, "Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_search::models::{IngestRequest, SearchRequest};
    use catalog_search::remote::methods;
    use catalog_search::{
        CatalogDocument, ChannelSettings, IndexChannelClient, NodeClient, RecentErrorLog,
        RemoteConnectionManager, RemoteSettings, RetryConfig, SearchError, SearchIndex,
        SqliteStore,
    };
    use serde_json::json;
    use std::time::Duration;

    /// Node whose index channels were never connected.
    async fn degraded_node() -> Arc<NodeService> {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_many(vec![
                CatalogDocument::new("A", "red chair", ""),
                CatalogDocument::new("B", "blue chair", ""),
            ])
            .await
            .unwrap();
        let errors = Arc::new(RecentErrorLog::default());
        let index = Arc::new(IndexChannelClient::new(
            "node-test",
            ChannelSettings::new("127.0.0.1", 1),
            Arc::clone(&errors),
        ));
        Arc::new(NodeService::new(
            "node-test",
            index as Arc<dyn SearchIndex>,
            Arc::new(store),
            errors,
        ))
    }

    fn manager(addr: SocketAddr) -> Arc<RemoteConnectionManager> {
        RemoteConnectionManager::new(
            RemoteSettings::new(format!("127.0.0.1:{}", addr.port()))
                .with_retry(
                    RetryConfig::new()
                        .with_base_delay(Duration::from_millis(20))
                        .with_max_attempts(5),
                )
                .with_connection_timeout(Duration::from_secs(2))
                .with_poll_interval(Duration::from_millis(20)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_server_starts() {
        let addr = start_server(degraded_node().await, "127.0.0.1", 0)
            .await
            .unwrap();
        assert!(addr.port() > 0);

        let client = NodeClient::with_defaults(&format!("127.0.0.1:{}", addr.port())).unwrap();
        client.health().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_reports_degraded_channels() {
        let addr = start_server(degraded_node().await, "127.0.0.1", 0)
            .await
            .unwrap();
        let manager = manager(addr);

        let status = manager.get_status().await.unwrap();
        assert!(!status.ingest_connected);
        assert!(!status.search_connected);
        assert_eq!(status.indexed_count, 2);
        assert_eq!(status.message, "Status for node-test");
    }

    #[tokio::test]
    async fn test_operations_degrade_to_structured_results() {
        let addr = start_server(degraded_node().await, "127.0.0.1", 0)
            .await
            .unwrap();
        let manager = manager(addr);

        let found = manager
            .search_and_fetch_items(&SearchRequest::new("chair", 10))
            .await
            .unwrap();
        assert!(found.items.is_empty());

        let ingest = manager
            .ingest_data(&IngestRequest::full_range())
            .await
            .unwrap();
        assert!(!ingest.success);
        assert_eq!(ingest.ingested_count, 0);
        assert_eq!(
            ingest.message,
            "Ingest channel not connected. Cannot ingest data."
        );

        let status = manager.get_status().await.unwrap();
        assert!(status
            .recent_errors
            .iter()
            .any(|e| e.ends_with("Ingest channel not connected. Cannot ingest data.")));
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_params() {
        let addr = start_server(degraded_node().await, "127.0.0.1", 0)
            .await
            .unwrap();
        let manager = manager(addr);

        let err = manager.call("drop_index", json!({})).await.unwrap_err();
        assert!(matches!(err, SearchError::Remote { code: -32601, .. }));

        let err = manager
            .call(methods::INGEST_DATA, json!({"startIndex": "many"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Remote { code: -32602, .. }));

        let health = manager
            .call(methods::HEALTH_CHECK, json!({}))
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
    }
}
