//! Ingestion of catalog documents into the index.

mod pipeline;

pub use pipeline::{IngestReport, IngestScope, IngestionPipeline};

use crate::models::CatalogDocument;

/// Searchable text of a document.
///
/// Name, description and category (when present) joined by single spaces,
/// lowercased and trimmed. `None` when nothing searchable remains.
pub fn normalize(doc: &CatalogDocument) -> Option<String> {
    let text = [
        Some(doc.name.as_str()),
        Some(doc.description.as_str()),
        doc.category.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
