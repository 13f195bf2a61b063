pub mod chat;
pub mod embedding_service;
pub mod ingestion_service;
pub mod llm_service;
pub mod providers;
pub mod retrieval_service;
pub mod vector_service;

pub use chat::{ChatOutcome, ChatService, ContextBuilder};
pub use embedding_service::EmbeddingService;
pub use ingestion_service::{IngestOutcome, IngestionService};
pub use llm_service::LlmService;
pub use retrieval_service::{RetrievalService, SearchHit};
pub use vector_service::VectorService;
