//! Query aggregation: index lookup, then hydration from the store.

use crate::config::{IndexConfig, IngestConfig};
use crate::engine::SearchIndex;
use crate::models::CatalogDocument;
use crate::store::DocumentStore;
use crate::{Result, SearchError};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// How a query string is sent to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// One query per term; ids in first-seen order across terms.
    #[default]
    PerTerm,
    /// The whole query in one request; engine order.
    Phrase,
}

impl FromStr for QueryMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-term" | "per_term" | "perterm" => Ok(QueryMode::PerTerm),
            "phrase" => Ok(QueryMode::Phrase),
            other => Err(SearchError::Config {
                message: format!("unknown query mode '{}' (expected per-term or phrase)", other),
            }),
        }
    }
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryMode::PerTerm => write!(f, "per-term"),
            QueryMode::Phrase => write!(f, "phrase"),
        }
    }
}

/// Trim, lowercase and split on runs of whitespace.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Answers free-text searches with hydrated catalog documents.
pub struct QueryAggregator {
    index: Arc<dyn SearchIndex>,
    store: Arc<dyn DocumentStore>,
    mode: QueryMode,
    collection: String,
    bucket: String,
    per_term_limit: u32,
}

impl QueryAggregator {
    pub fn new(index: Arc<dyn SearchIndex>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            index,
            store,
            mode: QueryMode::default(),
            collection: IndexConfig::COLLECTION.to_string(),
            bucket: IndexConfig::SEARCH_BUCKET.to_string(),
            per_term_limit: IngestConfig::PER_TERM_LIMIT,
        }
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_per_term_limit(mut self, limit: u32) -> Self {
        self.per_term_limit = limit.max(1);
        self
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Search for `query`, returning at most `limit` documents
    /// (`0` selects the default limit).
    ///
    /// A blank query returns nothing without contacting the index.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<CatalogDocument>> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        if !self.index.connection_state().search_connected {
            return Err(SearchError::SearchUnavailable);
        }

        let limit = match limit {
            0 => IngestConfig::DEFAULT_RESULT_LIMIT,
            n => n as usize,
        };

        let ids = match self.mode {
            QueryMode::PerTerm => self.per_term_ids(&terms).await?,
            QueryMode::Phrase => {
                self.index
                    .query(&self.collection, &self.bucket, &terms.join(" "), limit as u32, 0)
                    .await?
            }
        };
        debug!("Index returned {} ids for {:?}: {:?}", ids.len(), terms, ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.store.find_by_ids(&ids).await?;
        let mut items = order_by_ids(&ids, docs);
        items.truncate(limit);

        info!("Search for {:?} returned {} items", terms, items.len());
        Ok(items)
    }

    /// Ordered union of per-term hits; duplicates keep their first position.
    async fn per_term_ids(&self, terms: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for term in terms {
            let hits = self
                .index
                .query(&self.collection, &self.bucket, term, self.per_term_limit, 0)
                .await?;
            for id in hits {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
}

/// Reorder hydrated documents to follow `ids`; unknown ids are dropped.
fn order_by_ids(ids: &[String], docs: Vec<CatalogDocument>) -> Vec<CatalogDocument> {
    let mut by_id: HashMap<String, CatalogDocument> =
        docs.into_iter().map(|d| (d.id.clone(), d)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
