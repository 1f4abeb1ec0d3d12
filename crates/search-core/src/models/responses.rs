//! Request and response shapes of the node service operations.

use super::CatalogDocument;
use serde::{Deserialize, Serialize};

/// `SearchAndFetchItems` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: u32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: u32) -> Self {
        Self {
            query: query.into(),
            limit,
        }
    }
}

/// `SearchAndFetchItems` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<CatalogDocument>,
}

impl SearchResponse {
    /// Response with no items.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// `IngestData` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(default)]
    pub start_index: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub category_filter: String,
}

impl IngestRequest {
    /// The administrative "reingest everything" request.
    pub fn full_range() -> Self {
        Self {
            start_index: 0,
            limit: 1_000_000,
            category_filter: String::new(),
        }
    }
}

/// `IngestData` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub ingested_count: u64,
    pub message: String,
}

impl IngestResponse {
    /// Create a failed response with the given message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ingested_count: 0,
            message: message.into(),
        }
    }
}

/// `GetStatus` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub ingest_connected: bool,
    pub search_connected: bool,
    pub indexed_count: u64,
    pub message: String,
    #[serde(default)]
    pub recent_errors: Vec<String>,
}
