//! Ingestion pipeline: store scan → normalize → push.
//!
//! Failures are isolated per document: a failed push is counted and
//! recorded, and the batch continues with the next document.

use super::normalize;
use crate::config::{IndexConfig, IngestConfig};
use crate::engine::SearchIndex;
use crate::error_log::RecentErrorLog;
use crate::models::CatalogDocument;
use crate::store::{DocumentFilter, DocumentStore};
use crate::{Result, SearchError};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Which documents a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestScope {
    /// Flush the collection, then push every document.
    Full,
    /// Push one page of documents without flushing. `limit == 0` means no
    /// limit; a blank category matches everything.
    Range {
        start_index: u64,
        limit: u64,
        category: String,
    },
}

/// Counts of one ingestion run.
///
/// `attempted == succeeded + failed + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

enum Outcome {
    Pushed,
    Skipped,
    Failed,
}

/// Pushes store documents into the index.
pub struct IngestionPipeline {
    index: Arc<dyn SearchIndex>,
    store: Arc<dyn DocumentStore>,
    errors: Arc<RecentErrorLog>,
    node_id: String,
    collection: String,
    bucket: String,
    concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        store: Arc<dyn DocumentStore>,
        errors: Arc<RecentErrorLog>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            index,
            store,
            errors,
            node_id: node_id.into(),
            collection: IndexConfig::COLLECTION.to_string(),
            bucket: IndexConfig::SEARCH_BUCKET.to_string(),
            concurrency: IngestConfig::DEFAULT_CONCURRENCY,
        }
    }

    /// Pushes in flight at once, clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, IngestConfig::MAX_CONCURRENCY);
        self
    }

    /// Run one ingestion.
    ///
    /// Fails without touching the store when the ingest channel is down,
    /// and when the flush or the store read fails. Per-document push
    /// failures only show up in the report.
    pub async fn run(&self, scope: IngestScope) -> Result<IngestReport> {
        if !self.index.connection_state().ingest_connected {
            return Err(SearchError::IngestUnavailable);
        }

        let docs = match &scope {
            IngestScope::Full => {
                let flushed = self.index.flush(&self.collection).await.map_err(|e| {
                    self.record(format!("Flush of {} failed: {}", self.collection, e));
                    e
                })?;
                info!(
                    node_id = %self.node_id,
                    "Flushed {} entries from {} before reload", flushed, self.collection
                );
                self.store.find_all(&DocumentFilter::all(), 0, None).await
            }
            IngestScope::Range {
                start_index,
                limit,
                category,
            } => {
                let limit = (*limit > 0).then_some(*limit);
                self.store
                    .find_all(&DocumentFilter::category(category), *start_index, limit)
                    .await
            }
        }
        .map_err(|e| {
            self.record(format!("Store read failed during ingest: {}", e));
            e
        })?;

        info!(
            node_id = %self.node_id,
            "Ingesting {} documents ({:?}, concurrency {})",
            docs.len(),
            scope,
            self.concurrency
        );

        let report = stream::iter(docs)
            .map(|doc| self.ingest_one(doc))
            .buffer_unordered(self.concurrency)
            .fold(IngestReport::default(), |mut report, outcome| async move {
                report.attempted += 1;
                match outcome {
                    Outcome::Pushed => report.succeeded += 1,
                    Outcome::Skipped => report.skipped += 1,
                    Outcome::Failed => report.failed += 1,
                }
                report
            })
            .await;

        info!(
            node_id = %self.node_id,
            "Ingestion finished: {} attempted, {} ingested, {} errors, {} skipped",
            report.attempted,
            report.succeeded,
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    async fn ingest_one(&self, doc: CatalogDocument) -> Outcome {
        let Some(text) = normalize(&doc) else {
            warn!(node_id = %self.node_id, "Document {} has no searchable text; skipping", doc.id);
            return Outcome::Skipped;
        };

        match self
            .index
            .push(&self.collection, &self.bucket, &doc.id, &text)
            .await
        {
            Ok(()) => {
                debug!(node_id = %self.node_id, "Indexed {}", doc.id);
                Outcome::Pushed
            }
            Err(e) => {
                self.record(format!("Ingest error for {}: {}", doc.id, e));
                Outcome::Failed
            }
        }
    }

    fn record(&self, message: String) {
        error!(node_id = %self.node_id, "{}", message);
        self.errors.record(message);
    }
}
