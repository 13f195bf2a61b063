use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use super::{
    Conversation, DbPool, FileRecord, IngestionStatus, MessageRecord, MessageRole, MessageWithFile,
    RetrievalMode, RetrievedChunk,
};
use crate::services::providers::CatalogProvider;
use crate::utils::error::ApiError;

pub struct Repository {
    pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogProvider for Repository {
    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    async fn create_file(&self, file_id: Uuid, storage_key: &str) -> Result<FileRecord, ApiError> {
        let file = sqlx::query_as::<_, FileRecord>(
            r#"INSERT INTO files (id, storage_key, ingestion_status)
               VALUES ($1, $2, 'uploaded')
               RETURNING id, storage_key, ingestion_status, error_message, created_at, updated_at"#,
        )
        .bind(file_id)
        .bind(storage_key)
        .fetch_one(self.pool.get_pool())
        .await?;

        debug!("Created file record {}", file_id);
        Ok(file)
    }

    async fn get_file(&self, file_id: Uuid) -> Result<Option<FileRecord>, ApiError> {
        let file = sqlx::query_as::<_, FileRecord>(
            r#"SELECT id, storage_key, ingestion_status, error_message, created_at, updated_at
               FROM files WHERE id = $1"#,
        )
        .bind(file_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(file)
    }

    async fn list_files(&self, limit: i64, offset: i64) -> Result<Vec<FileRecord>, ApiError> {
        let files = sqlx::query_as::<_, FileRecord>(
            r#"SELECT id, storage_key, ingestion_status, error_message, created_at, updated_at
               FROM files
               ORDER BY created_at DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(files)
    }

    async fn count_files(&self) -> Result<i64, ApiError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files")
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(count)
    }

    async fn update_file_status(
        &self,
        file_id: Uuid,
        status: IngestionStatus,
        error_message: Option<String>,
    ) -> Result<Option<FileRecord>, ApiError> {
        let file = sqlx::query_as::<_, FileRecord>(
            r#"UPDATE files
               SET ingestion_status = $2, error_message = $3, updated_at = now()
               WHERE id = $1
               RETURNING id, storage_key, ingestion_status, error_message, created_at, updated_at"#,
        )
        .bind(file_id)
        .bind(status)
        .bind(error_message)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(file)
    }

    /// Deletes the file row; referencing messages keep their text and get a
    /// null file reference (FK is ON DELETE SET NULL).
    async fn delete_file(&self, file_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(file_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    async fn create_conversation(&self) -> Result<Conversation, ApiError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"INSERT INTO conversations (id) VALUES ($1)
               RETURNING id, created_at"#,
        )
        .bind(Uuid::new_v4())
        .fetch_one(self.pool.get_pool())
        .await?;

        debug!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, ApiError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, created_at FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(conversation)
    }

    async fn list_conversations(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, ApiError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"SELECT id, created_at FROM conversations
               ORDER BY created_at DESC
               LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(conversations)
    }

    async fn count_conversations(&self) -> Result<i64, ApiError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM conversations")
            .fetch_one(self.pool.get_pool())
            .await?;

        Ok(count)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    async fn count_messages(&self, conversation_id: Uuid) -> Result<i64, ApiError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(count)
    }

    async fn messages_with_files(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageWithFile>, ApiError> {
        #[derive(FromRow)]
        struct JoinedRow {
            id: Uuid,
            conversation_id: Uuid,
            role: MessageRole,
            content: String,
            file_id: Option<Uuid>,
            retrieval_mode: Option<RetrievalMode>,
            retrieved_chunks: Option<Json<Vec<RetrievedChunk>>>,
            created_at: DateTime<Utc>,
            f_id: Option<Uuid>,
            f_storage_key: Option<String>,
            f_ingestion_status: Option<IngestionStatus>,
            f_error_message: Option<String>,
            f_created_at: Option<DateTime<Utc>>,
            f_updated_at: Option<DateTime<Utc>>,
        }

        let rows = sqlx::query_as::<_, JoinedRow>(
            r#"SELECT
                m.id, m.conversation_id, m.role, m.content, m.file_id,
                m.retrieval_mode, m.retrieved_chunks, m.created_at,
                f.id AS f_id,
                f.storage_key AS f_storage_key,
                f.ingestion_status AS f_ingestion_status,
                f.error_message AS f_error_message,
                f.created_at AS f_created_at,
                f.updated_at AS f_updated_at
               FROM messages m
               LEFT JOIN files f ON f.id = m.file_id
               WHERE m.conversation_id = $1
               ORDER BY m.created_at ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        let messages = rows
            .into_iter()
            .map(|row| {
                let file = match (
                    row.f_id,
                    row.f_storage_key,
                    row.f_ingestion_status,
                    row.f_created_at,
                    row.f_updated_at,
                ) {
                    (Some(id), Some(storage_key), Some(status), Some(created), Some(updated)) => {
                        Some(FileRecord {
                            id,
                            storage_key,
                            ingestion_status: status,
                            error_message: row.f_error_message,
                            created_at: created,
                            updated_at: updated,
                        })
                    }
                    _ => None,
                };

                MessageWithFile {
                    message: MessageRecord {
                        id: row.id,
                        conversation_id: row.conversation_id,
                        role: row.role,
                        content: row.content,
                        file_id: row.file_id,
                        retrieval_mode: row.retrieval_mode,
                        retrieved_chunks: row.retrieved_chunks,
                        created_at: row.created_at,
                    },
                    file,
                }
            })
            .collect();

        Ok(messages)
    }

    async fn messages_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        let messages = sqlx::query_as::<_, MessageRecord>(
            r#"SELECT id, conversation_id, role, content, file_id,
                      retrieval_mode, retrieved_chunks, created_at
               FROM messages
               WHERE conversation_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(messages)
    }

    async fn insert_chat_turn(
        &self,
        conversation_id: Uuid,
        user_content: String,
        user_file_id: Option<Uuid>,
        assistant_content: String,
        mode: RetrievalMode,
        evidence: Vec<RetrievedChunk>,
    ) -> Result<(Uuid, Uuid), ApiError> {
        let user_message_id = Uuid::new_v4();
        let assistant_message_id = Uuid::new_v4();

        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, role, content, file_id, created_at)
               VALUES ($1, $2, 'user', $3, $4, $5)"#,
        )
        .bind(user_message_id)
        .bind(conversation_id)
        .bind(&user_content)
        .bind(user_file_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO messages
               (id, conversation_id, role, content, retrieval_mode, retrieved_chunks, created_at)
               VALUES ($1, $2, 'assistant', $3, $4, $5, $6)"#,
        )
        .bind(assistant_message_id)
        .bind(conversation_id)
        .bind(&assistant_content)
        .bind(mode)
        .bind(Json(evidence))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Persisted chat turn for conversation {}: user={}, assistant={}",
            conversation_id, user_message_id, assistant_message_id
        );

        Ok((user_message_id, assistant_message_id))
    }
}
