use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::request::{ChatRequest, ListParams};
use crate::models::response::{
    ChatChunk, ChatResponse, ConversationDetailResponse, ConversationListResponse,
    ConversationSummary, MessageResponse,
};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /chat — run one chat turn (inline or RAG).
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(
        "Chat request: message_length={}, conversation_id={:?}, file_id={:?}",
        request.message.len(),
        request.conversation_id,
        request.file_id
    );

    let outcome = state
        .chat
        .handle_chat(&request.message, request.conversation_id, request.file_id)
        .await?;

    Ok(Json(ChatResponse {
        conversation_id: outcome.conversation_id,
        response: outcome.response,
        retrieval_mode: outcome.mode.as_str().to_string(),
        retrieved_chunks: outcome.evidence.iter().map(ChatChunk::from).collect(),
    }))
}

/// GET /chats — conversations newest first, with message counts.
pub async fn list_conversations_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let (limit, offset) = params.bounded();

    let total = state.catalog.count_conversations().await?;
    let conversations = state.catalog.list_conversations(limit, offset).await?;

    let mut chats = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let message_count = state.catalog.count_messages(conversation.id).await?;
        chats.push(ConversationSummary {
            conversation_id: conversation.id,
            created_at: conversation.created_at,
            message_count,
        });
    }

    Ok(Json(ConversationListResponse {
        chats,
        total,
        limit,
        offset,
    }))
}

/// GET /chats/{id} — full conversation history.
pub async fn get_conversation_handler(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let conversation = state
        .catalog
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| {
            ApiError::RecordNotFound(format!("Conversation not found: {}", conversation_id))
        })?;

    let messages = state
        .catalog
        .messages_for_conversation(conversation_id)
        .await?;

    let message_responses = messages
        .into_iter()
        .map(|message| {
            let retrieved_chunks = message.retrieved_chunks.as_ref().and_then(|chunks| {
                if chunks.0.is_empty() {
                    None
                } else {
                    Some(chunks.0.iter().map(ChatChunk::from).collect())
                }
            });

            MessageResponse {
                role: match message.role {
                    crate::database::MessageRole::User => "user".to_string(),
                    crate::database::MessageRole::Assistant => "assistant".to_string(),
                },
                content: message.content,
                file_id: message.file_id,
                retrieval_mode: message.retrieval_mode.map(|m| m.as_str().to_string()),
                retrieved_chunks,
                created_at: message.created_at,
            }
        })
        .collect();

    Ok(Json(ConversationDetailResponse {
        conversation_id: conversation.id,
        created_at: conversation.created_at,
        messages: message_responses,
    }))
}
