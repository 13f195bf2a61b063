use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{MessageRecord, MessageRole, MessageWithFile, RetrievalMode, RetrievedChunk};
use crate::services::chat::classifier::classify_files;
use crate::services::chat::context_builder::{retrieved_block, ContextBuilder};
use crate::services::llm_service::semantic_search_tool;
use crate::services::providers::{
    CatalogProvider, EmbeddingProvider, LlmMessage, LlmProvider, ToolsReply, VectorProvider,
};
use crate::utils::error::ApiError;

const SEARCH_TOOL_NAME: &str = "semantic_search";
const NO_RESULTS_FALLBACK: &str = "I couldn't find relevant information in the documents.";
const MIN_TOP_K: u64 = 1;
const MAX_TOP_K: u64 = 20;

#[derive(Debug)]
pub struct ChatOutcome {
    pub conversation_id: Uuid,
    pub response: String,
    pub mode: RetrievalMode,
    pub evidence: Vec<RetrievedChunk>,
}

/// One chat turn end to end: ensure the conversation, classify its files,
/// assemble the window, run one or two LLM calls (dispatching the search
/// tool in between), and persist the turn only after the final call
/// succeeded.
pub struct ChatService {
    catalog: Arc<dyn CatalogProvider>,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorProvider>,
    context_builder: ContextBuilder,
    default_top_k: usize,
}

impl ChatService {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorProvider>,
        context_builder: ContextBuilder,
        default_top_k: usize,
    ) -> Self {
        Self {
            catalog,
            llm,
            embedder,
            vectors,
            context_builder,
            default_top_k,
        }
    }

    pub async fn handle_chat(
        &self,
        message_text: &str,
        conversation_id: Option<Uuid>,
        file_id: Option<Uuid>,
    ) -> Result<ChatOutcome, ApiError> {
        if message_text.trim().is_empty() {
            return Err(ApiError::ValidationFailure(
                "Message must not be empty".to_string(),
            ));
        }

        let conversation_id = match conversation_id {
            Some(id) => {
                self.catalog
                    .get_conversation(id)
                    .await?
                    .ok_or_else(|| ApiError::RecordNotFound(format!("Conversation not found: {}", id)))?;
                id
            }
            None => {
                let conversation = self.catalog.create_conversation().await?;
                info!("Created new conversation {}", conversation.id);
                conversation.id
            }
        };

        let history = self.catalog.messages_with_files(conversation_id).await?;
        let classified = classify_files(&history, self.catalog.as_ref(), file_id).await?;

        // Pending user turn, not yet persisted, joins the window.
        let new_file = match file_id {
            Some(id) => self.catalog.get_file(id).await?,
            None => None,
        };
        let mut all_messages = history;
        all_messages.push(MessageWithFile {
            message: MessageRecord {
                id: Uuid::new_v4(),
                conversation_id,
                role: MessageRole::User,
                content: message_text.to_string(),
                file_id,
                retrieval_mode: None,
                retrieved_chunks: None,
                created_at: Utc::now(),
            },
            file: new_file,
        });

        let (context, _accepted) = self
            .context_builder
            .build_window(&all_messages, &classified.inline_ids)
            .await?;

        let (response, mode, evidence) = if classified.rag_ids.is_empty() {
            info!("Inline mode: no completed files in conversation");
            let text = self.llm.complete(context).await?;
            (text, RetrievalMode::Inline, Vec::new())
        } else {
            info!(
                "RAG mode available: {} completed file(s) in conversation",
                classified.rag_ids.len()
            );
            self.run_tool_turn(context, &classified.rag_ids).await?
        };

        // Persist in a spawned task: once the final LLM call has succeeded
        // a client disconnect must not abort the write.
        let catalog = Arc::clone(&self.catalog);
        let user_content = message_text.to_string();
        let assistant_content = response.clone();
        let stored_evidence = evidence.clone();
        tokio::spawn(async move {
            catalog
                .insert_chat_turn(
                    conversation_id,
                    user_content,
                    file_id,
                    assistant_content,
                    mode,
                    stored_evidence,
                )
                .await
        })
        .await
        .map_err(|e| ApiError::Internal(format!("persistence task failed: {}", e)))??;

        info!(
            "Chat turn completed for conversation {}: mode={}, chunks={}",
            conversation_id,
            mode.as_str(),
            evidence.len()
        );

        Ok(ChatOutcome {
            conversation_id,
            response,
            mode,
            evidence,
        })
    }

    async fn run_tool_turn(
        &self,
        context: Vec<LlmMessage>,
        rag_ids: &[Uuid],
    ) -> Result<(String, RetrievalMode, Vec<RetrievedChunk>), ApiError> {
        let reply = self
            .llm
            .complete_with_tools(context.clone(), vec![semantic_search_tool()])
            .await?;

        match reply {
            ToolsReply::Text(text) => {
                info!("LLM responded directly without tool call");
                if text.trim().is_empty() {
                    return Err(ApiError::LlmFailure(
                        "LLM returned an empty response".to_string(),
                    ));
                }
                Ok((text, RetrievalMode::Inline, Vec::new()))
            }
            ToolsReply::ToolCall { name, arguments } => {
                if name != SEARCH_TOOL_NAME {
                    return Err(ApiError::LlmFailure(format!(
                        "LLM requested unknown tool: {}",
                        name
                    )));
                }

                let query = arguments
                    .get("query")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ApiError::LlmFailure("tool call is missing the query argument".to_string())
                    })?;

                // The model can hand back anything; the bounds are ours.
                let top_k = arguments
                    .get("top_k")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(self.default_top_k as u64)
                    .clamp(MIN_TOP_K, MAX_TOP_K) as usize;

                info!("Searching: top_k={}, query_len={}", top_k, query.len());

                let query_embedding = self.embedder.embed(query).await?;
                let matches = self
                    .vectors
                    .query(query_embedding, top_k, rag_ids.to_vec())
                    .await?;

                // Tool was invoked, so the turn is rag-mode even when the
                // index comes back empty.
                if matches.is_empty() {
                    warn!("No chunks retrieved from vector search");
                    return Ok((
                        NO_RESULTS_FALLBACK.to_string(),
                        RetrievalMode::Rag,
                        Vec::new(),
                    ));
                }

                let evidence: Vec<RetrievedChunk> = matches
                    .into_iter()
                    .map(|m| RetrievedChunk {
                        chunk_text: m
                            .metadata
                            .map(|metadata| metadata.chunk_text)
                            .unwrap_or_default(),
                        similarity_score: m.score,
                    })
                    .collect();

                info!("Retrieved {} chunks, calling LLM with evidence", evidence.len());

                let mut with_evidence = context;
                with_evidence.push(LlmMessage::system(retrieved_block(&evidence)));

                let answer = self.llm.complete(with_evidence).await?;
                Ok((answer, RetrievalMode::Rag, evidence))
            }
        }
    }
}
