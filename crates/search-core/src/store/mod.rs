//! Document store interface.
//!
//! The node only reads catalog records: full or paged scans for ingestion,
//! by-id lookups for hydration, and counts for status.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::models::CatalogDocument;
use crate::Result;
use async_trait::async_trait;

/// Filter applied to scans and counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    /// Only documents of this category.
    pub category: Option<String>,
}

impl DocumentFilter {
    /// Match every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match one category; a blank category matches everything.
    pub fn category(category: &str) -> Self {
        let category = category.trim();
        Self {
            category: (!category.is_empty()).then(|| category.to_string()),
        }
    }
}

/// Read access to the catalog.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Documents matching `filter` in stable store order, skipping `skip`
    /// and returning at most `limit` (`None` for no limit).
    async fn find_all(
        &self,
        filter: &DocumentFilter,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<CatalogDocument>>;

    /// Documents whose id is in `ids`. Unknown ids are ignored; no order is
    /// guaranteed.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogDocument>>;

    /// Number of documents matching `filter`.
    async fn count(&self, filter: &DocumentFilter) -> Result<u64>;
}
