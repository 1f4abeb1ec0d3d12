//! Catalog Search - headless core of a search-index node.
//!
//! A node supervises an external inverted-index engine, keeps an ingest and
//! a search channel to it, loads catalog documents from the document store
//! into the index and answers free-text searches by combining index hits
//! with store hydration. The HTTP façade and CLI live in the `search-node`
//! crate; everything here is usable without them.
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_search::{ChannelSettings, IndexChannelClient, NodeService, RecentErrorLog, SqliteStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> catalog_search::Result<()> {
//!     let errors = Arc::new(RecentErrorLog::default());
//!     let store = Arc::new(SqliteStore::open("catalog.db")?);
//!     let index = Arc::new(IndexChannelClient::new(
//!         "node-1",
//!         ChannelSettings::new("127.0.0.1", 1491),
//!         Arc::clone(&errors),
//!     ));
//!     index.connect(None).await?;
//!
//!     let node = NodeService::new("node-1", index, store, errors);
//!     node.reload_index().await?;
//!     let found = node
//!         .search_and_fetch_items(catalog_search::models::SearchRequest::new("chair", 10))
//!         .await;
//!     println!("Found {} items", found.items.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod error_log;
pub mod ingest;
pub mod models;
pub mod network;
pub mod node;
pub mod query;
pub mod remote;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use engine::{
    ChannelSettings, ConnectReport, EngineLaunchConfig, EngineStatus, EngineSupervisor,
    IndexChannelClient, NodeConnectionState, SearchIndex,
};
pub use error::{Result, SearchError};
pub use error_log::RecentErrorLog;
pub use ingest::{IngestReport, IngestScope, IngestionPipeline};
pub use models::CatalogDocument;
pub use network::{BackoffState, RetryConfig};
pub use node::NodeService;
pub use query::{QueryAggregator, QueryMode};
pub use remote::{NodeClient, RemoteConnectionManager, RemoteSettings, RemoteState};
pub use store::{DocumentFilter, DocumentStore, SqliteStore};
