//! Catalog documents as read from the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog record. Owned by the document store; the node only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CatalogDocument {
    /// Create a document with zero price, no category, created now.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            price: 0.0,
            category: None,
            created_at: Utc::now(),
        }
    }

    /// Set the price. Negative prices are clamped to zero.
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price.max(0.0);
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_clamps_negative_price() {
        let doc = CatalogDocument::new("A", "red chair", "").with_price(-3.5);
        assert_eq!(doc.price, 0.0);
    }

    #[test]
    fn test_serializes_camel_case_without_missing_category() {
        let doc = CatalogDocument::new("A", "red chair", "wooden");
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json.get("createdAt").is_some());
        assert!(json.get("category").is_none());
        assert_eq!(json["price"], 0.0);
    }

    #[test]
    fn test_price_defaults_when_absent() {
        let doc: CatalogDocument = serde_json::from_str(
            r#"{"id":"B","name":"lamp","description":"","createdAt":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(doc.price, 0.0);
        assert_eq!(doc.category, None);
    }
}
