//! Node service façade.
//!
//! The three remote operations of a search node. None of them fails: every
//! error becomes a structured response, and connection state is available
//! through `get_status` so callers can tell "no results" from "degraded".

use crate::engine::SearchIndex;
use crate::error_log::RecentErrorLog;
use crate::ingest::{IngestReport, IngestScope, IngestionPipeline};
use crate::models::{IngestRequest, IngestResponse, SearchRequest, SearchResponse, StatusResponse};
use crate::query::{QueryAggregator, QueryMode};
use crate::store::{DocumentFilter, DocumentStore};
use crate::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

const INGEST_UNAVAILABLE: &str = "Ingest channel not connected. Cannot ingest data.";

/// A search node as seen by remote callers.
pub struct NodeService {
    node_id: String,
    index: Arc<dyn SearchIndex>,
    store: Arc<dyn DocumentStore>,
    errors: Arc<RecentErrorLog>,
    pipeline: IngestionPipeline,
    aggregator: QueryAggregator,
}

impl NodeService {
    pub fn new(
        node_id: impl Into<String>,
        index: Arc<dyn SearchIndex>,
        store: Arc<dyn DocumentStore>,
        errors: Arc<RecentErrorLog>,
    ) -> Self {
        let node_id = node_id.into();
        let pipeline = IngestionPipeline::new(
            Arc::clone(&index),
            Arc::clone(&store),
            Arc::clone(&errors),
            node_id.clone(),
        );
        let aggregator = QueryAggregator::new(Arc::clone(&index), Arc::clone(&store));
        Self {
            node_id,
            index,
            store,
            errors,
            pipeline,
            aggregator,
        }
    }

    pub fn with_query_mode(mut self, mode: QueryMode) -> Self {
        self.aggregator = self.aggregator.with_mode(mode);
        self
    }

    pub fn with_ingest_concurrency(mut self, concurrency: usize) -> Self {
        self.pipeline = self.pipeline.with_concurrency(concurrency);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn errors(&self) -> &Arc<RecentErrorLog> {
        &self.errors
    }

    /// `GetStatus`.
    pub async fn get_status(&self) -> StatusResponse {
        info!(node_id = %self.node_id, "GetStatus request");
        let state = self.index.connection_state();

        let indexed_count = match self.store.count(&DocumentFilter::all()).await {
            Ok(count) => count,
            Err(e) => {
                error!(node_id = %self.node_id, "Error getting item count for status: {}", e);
                self.errors
                    .record(format!("Error getting item count: {}", e));
                0
            }
        };

        StatusResponse {
            ingest_connected: state.ingest_connected,
            search_connected: state.search_connected,
            indexed_count,
            message: format!("Status for {}", self.node_id),
            recent_errors: self.errors.recent_messages(),
        }
    }

    /// `IngestData`: range ingest without flushing.
    pub async fn ingest_data(&self, request: IngestRequest) -> IngestResponse {
        info!(
            node_id = %self.node_id,
            "IngestData request: startIndex={}, limit={}, category={:?}",
            request.start_index,
            request.limit,
            request.category_filter
        );

        if !self.index.connection_state().ingest_connected {
            return self.ingest_unavailable();
        }

        let scope = IngestScope::Range {
            start_index: request.start_index,
            limit: request.limit,
            category: request.category_filter,
        };
        match self.pipeline.run(scope).await {
            Ok(report) if report.attempted == 0 => {
                let message = "No new items found to ingest for this range.";
                info!(node_id = %self.node_id, "{}", message);
                IngestResponse {
                    success: true,
                    ingested_count: 0,
                    message: message.to_string(),
                }
            }
            Ok(report) => IngestResponse {
                success: true,
                ingested_count: report.succeeded,
                message: format!(
                    "Ingested {} items. Errors: {}. Skipped: {}",
                    report.succeeded, report.failed, report.skipped
                ),
            },
            Err(e) if e.is_channel_unavailable() => self.ingest_unavailable(),
            Err(e) => {
                error!(node_id = %self.node_id, "Error during data ingestion: {}", e);
                self.errors.record(format!("General ingest error: {}", e));
                IngestResponse::failure(format!("Failed to ingest data: {}", e))
            }
        }
    }

    fn ingest_unavailable(&self) -> IngestResponse {
        error!(node_id = %self.node_id, "{}", INGEST_UNAVAILABLE);
        self.errors.record(INGEST_UNAVAILABLE);
        IngestResponse::failure(INGEST_UNAVAILABLE)
    }

    /// `SearchAndFetchItems`.
    pub async fn search_and_fetch_items(&self, request: SearchRequest) -> SearchResponse {
        info!(
            node_id = %self.node_id,
            "SearchAndFetchItems request: query={:?}, limit={}", request.query, request.limit
        );

        match self.aggregator.search(&request.query, request.limit).await {
            Ok(items) => SearchResponse { items },
            Err(e) if e.is_channel_unavailable() => {
                warn!(node_id = %self.node_id, "Search channel not connected; returning no items");
                SearchResponse::empty()
            }
            Err(e) => {
                error!(node_id = %self.node_id, "Search for {:?} failed: {}", request.query, e);
                self.errors.record(format!("Search error: {}", e));
                SearchResponse::empty()
            }
        }
    }

    /// Bulk reload: flush the collection and push every stored document.
    pub async fn reload_index(&self) -> Result<IngestReport> {
        info!(node_id = %self.node_id, "Starting bulk reload");
        self.pipeline.run(IngestScope::Full).await.map_err(|e| {
            error!(node_id = %self.node_id, "Bulk reload failed: {}", e);
            self.errors
                .record(format!("Bulk reload failed ({}): {}", self.node_id, e));
            e
        })
    }
}
