//! Data models shared by the node service and its consumers.

mod document;
mod responses;

pub use document::CatalogDocument;
pub use responses::{
    IngestRequest, IngestResponse, SearchRequest, SearchResponse, StatusResponse,
};
