use std::sync::Arc;

use crate::services::providers::{BlobProvider, CatalogProvider, VectorProvider};
use crate::services::{ChatService, IngestionService, RetrievalService};

/// Process-wide handles, created once at startup and shared across requests.
pub struct AppState {
    pub catalog: Arc<dyn CatalogProvider>,
    pub blob: Arc<dyn BlobProvider>,
    pub vectors: Arc<dyn VectorProvider>,
    pub chat: Arc<ChatService>,
    pub ingestion: Arc<IngestionService>,
    pub retrieval: Arc<RetrievalService>,
    pub presign_ttl_seconds: u64,
}
