//! Consumer-side commands: call a running node through the remote
//! connection manager and print the result.

use anyhow::Result;
use catalog_search::models::{IngestRequest, SearchResponse, SearchRequest};
use catalog_search::{RemoteConnectionManager, RemoteSettings};
use serde::Serialize;
use std::sync::Arc;

pub fn connect(endpoint: &str) -> Result<Arc<RemoteConnectionManager>> {
    let manager = RemoteConnectionManager::new(RemoteSettings::new(endpoint))?;
    manager.start();
    Ok(manager)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Trim and lowercase a user query; `None` when nothing is left.
pub fn normalize_query(query: &str) -> Option<String> {
    let query = query.trim().to_lowercase();
    (!query.is_empty()).then_some(query)
}

pub async fn status(manager: &Arc<RemoteConnectionManager>) -> Result<()> {
    let status = manager.get_status().await?;
    print_json(&status)
}

pub async fn search(manager: &Arc<RemoteConnectionManager>, query: &str, limit: u32) -> Result<()> {
    let response = match normalize_query(query) {
        Some(query) => {
            manager
                .search_and_fetch_items(&SearchRequest::new(query, limit))
                .await?
        }
        None => SearchResponse::empty(),
    };
    print_json(&response)
}

pub async fn ingest(manager: &Arc<RemoteConnectionManager>, request: IngestRequest) -> Result<()> {
    let response = manager.ingest_data(&request).await?;
    print_json(&response)?;
    if !response.success {
        anyhow::bail!("ingest failed: {}", response.message);
    }
    Ok(())
}
