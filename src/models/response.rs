use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::database::{FileRecord, RetrievedChunk};

#[derive(Debug, Serialize)]
pub struct PresignResponse {
    pub file_id: Uuid,
    pub presigned_url: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub chunks_created: usize,
    pub vectors_upserted: usize,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub message: String,
    pub file_id: Uuid,
    pub ingestion_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<IngestSummary>,
}

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub file_id: Uuid,
    pub storage_key: String,
    pub ingestion_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FileRecord> for FileResponse {
    fn from(file: FileRecord) -> Self {
        Self {
            file_id: file.id,
            storage_key: file.storage_key,
            ingestion_status: file.ingestion_status.as_str().to_string(),
            error_message: file.error_message,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct FileDetailResponse {
    pub file_id: Uuid,
    pub storage_key: String,
    pub ingestion_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub presigned_download_url: String,
    pub download_url_expires_in_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FileDeleteResponse {
    pub deleted: bool,
    pub vectors_removed: usize,
}

/// Evidence entry as stored on a message: chunk text plus its score.
#[derive(Debug, Serialize)]
pub struct ChatChunk {
    pub chunk_text: String,
    pub similarity_score: f32,
}

impl From<&RetrievedChunk> for ChatChunk {
    fn from(chunk: &RetrievedChunk) -> Self {
        Self {
            chunk_text: chunk.chunk_text.clone(),
            similarity_score: chunk.similarity_score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub response: String,
    pub retrieval_mode: String,
    pub retrieved_chunks: Vec<ChatChunk>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_chunks: Option<Vec<ChatChunk>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub chats: Vec<ConversationSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub conversation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<MessageResponse>,
}

/// Retrieval debug endpoint result with full provenance.
#[derive(Debug, Serialize)]
pub struct RetrieveResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<Uuid>,
    pub chunk_text: String,
    pub similarity_score: f32,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub results: Vec<RetrieveResult>,
}
