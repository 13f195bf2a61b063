use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::{
    Conversation, FileRecord, IngestionStatus, MessageRecord, MessageWithFile, RetrievalMode,
    RetrievedChunk,
};
use crate::utils::error::ApiError;

#[cfg(test)]
use mockall::automock;

/// One LLM input message. Text-only for most turns; the first user message
/// of an assembled window may carry inline file parts.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMessage {
    pub role: String,
    pub content: LlmContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    InputFile { filename: String, data_url: String },
    InputText { text: String },
}

impl LlmMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: LlmContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: LlmContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: LlmContent::Text(text.into()),
        }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: LlmContent::Parts(parts),
        }
    }
}

/// Outcome of a tool-enabled completion: either the model answered directly
/// or it asked for a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolsReply {
    Text(String),
    ToolCall { name: String, arguments: Value },
}

/// Metadata stored alongside every chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_id: Uuid,
    pub chunk_id: Uuid,
    pub chunk_index: usize,
    pub chunk_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorEntry {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;

    /// Batch embedding; the output order matches the input order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ApiError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, messages: Vec<LlmMessage>) -> Result<String, ApiError>;

    async fn complete_with_tools(
        &self,
        messages: Vec<LlmMessage>,
        tools: Vec<Value>,
    ) -> Result<ToolsReply, ApiError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VectorProvider: Send + Sync {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<usize, ApiError>;

    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        file_ids: Vec<Uuid>,
    ) -> Result<Vec<VectorMatch>, ApiError>;

    async fn delete(&self, ids: Vec<String>) -> Result<usize, ApiError>;

    async fn delete_by_file_id(&self, file_id: Uuid) -> Result<usize, ApiError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlobProvider: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, ApiError>;

    fn signed_put(&self, key: &str, ttl_seconds: u64) -> Result<String, ApiError>;

    fn signed_get(&self, key: &str, ttl_seconds: u64) -> Result<String, ApiError>;
}

/// Relational catalog capability. `Repository` is the sqlx-backed
/// implementation; controllers only see this seam.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn create_file(&self, file_id: Uuid, storage_key: &str)
        -> Result<FileRecord, ApiError>;

    async fn get_file(&self, file_id: Uuid) -> Result<Option<FileRecord>, ApiError>;

    async fn list_files(&self, limit: i64, offset: i64) -> Result<Vec<FileRecord>, ApiError>;

    async fn count_files(&self) -> Result<i64, ApiError>;

    async fn update_file_status(
        &self,
        file_id: Uuid,
        status: IngestionStatus,
        error_message: Option<String>,
    ) -> Result<Option<FileRecord>, ApiError>;

    async fn delete_file(&self, file_id: Uuid) -> Result<bool, ApiError>;

    async fn create_conversation(&self) -> Result<Conversation, ApiError>;

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, ApiError>;

    async fn list_conversations(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, ApiError>;

    async fn count_conversations(&self) -> Result<i64, ApiError>;

    async fn count_messages(&self, conversation_id: Uuid) -> Result<i64, ApiError>;

    /// Ascending by creation time, referenced files eagerly attached.
    async fn messages_with_files(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageWithFile>, ApiError>;

    async fn messages_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageRecord>, ApiError>;

    /// User message then assistant message, committed as one unit.
    async fn insert_chat_turn(
        &self,
        conversation_id: Uuid,
        user_content: String,
        user_file_id: Option<Uuid>,
        assistant_content: String,
        mode: RetrievalMode,
        evidence: Vec<RetrievedChunk>,
    ) -> Result<(Uuid, Uuid), ApiError>;
}
