use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ingestion_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Uploaded,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Uploaded => "uploaded",
            IngestionStatus::Completed => "completed",
            IngestionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "retrieval_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Inline,
    Rag,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Inline => "inline",
            RetrievalMode::Rag => "rag",
        }
    }
}

/// Evidence entry stored on assistant messages and replayed into later turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_text: String,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub storage_key: String,
    pub ingestion_status: IngestionStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub file_id: Option<Uuid>,
    pub retrieval_mode: Option<RetrievalMode>,
    pub retrieved_chunks: Option<Json<Vec<RetrievedChunk>>>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn evidence(&self) -> &[RetrievedChunk] {
        self.retrieved_chunks
            .as_ref()
            .map(|chunks| chunks.0.as_slice())
            .unwrap_or(&[])
    }
}

/// A message with its referenced file eagerly attached (single joined query;
/// the classifier and assembler must not do per-message lookups).
#[derive(Debug, Clone)]
pub struct MessageWithFile {
    pub message: MessageRecord,
    pub file: Option<FileRecord>,
}
