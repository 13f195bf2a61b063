use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ContextConfig;
use crate::database::{MessageRole, MessageWithFile, RetrievalMode, RetrievedChunk};
use crate::services::providers::{BlobProvider, ContentPart, LlmMessage};
use crate::utils::error::ApiError;
use crate::utils::helpers::filename_from_key;

const EVIDENCE_HEADER: &str = "Context used for this response:\n";
const RETRIEVED_HEADER: &str = "Retrieved relevant information from documents:\n";

struct InlineFile {
    file_id: Uuid,
    filename: String,
    size_bytes: u64,
    data_url: String,
    first_mentioned_at: DateTime<Utc>,
}

/// Builds the LLM input window for one chat turn: inline files grouped onto
/// the first user message, the most recent messages only, and stored
/// evidence replayed after the assistant turns that used it.
pub struct ContextBuilder {
    blob: Arc<dyn BlobProvider>,
    max_messages: usize,
    max_total_bytes: u64,
    max_single_file_bytes: u64,
}

impl ContextBuilder {
    pub fn new(blob: Arc<dyn BlobProvider>, config: &ContextConfig) -> Self {
        Self {
            blob,
            max_messages: config.max_messages,
            max_total_bytes: config.max_total_inline_bytes,
            max_single_file_bytes: config.max_single_file_bytes,
        }
    }

    /// Returns the rendered window plus the ids of files actually sent
    /// inline (accepted by both size checks).
    pub async fn build_window(
        &self,
        all_messages: &[MessageWithFile],
        inline_ids: &[Uuid],
    ) -> Result<(Vec<LlmMessage>, HashSet<Uuid>), ApiError> {
        if all_messages.is_empty() {
            return Ok((Vec::new(), HashSet::new()));
        }

        let collected = self.collect_inline_files(all_messages, inline_ids).await;
        let selected = self.select_within_budget(collected);
        let accepted: HashSet<Uuid> = selected.iter().map(|f| f.file_id).collect();

        let window = recent_messages(all_messages, self.max_messages);

        let mut rendered: Vec<LlmMessage> = Vec::with_capacity(window.len() + 1);
        let mut files_pending = true;

        for entry in window {
            let message = &entry.message;
            match message.role {
                MessageRole::User if files_pending => {
                    // First user message of the window carries every
                    // accepted file, then its own text.
                    let mut parts: Vec<ContentPart> = selected
                        .iter()
                        .map(|file| ContentPart::InputFile {
                            filename: file.filename.clone(),
                            data_url: file.data_url.clone(),
                        })
                        .collect();
                    parts.push(ContentPart::InputText {
                        text: message.content.clone(),
                    });

                    debug!("Attached {} inline files to first user message", selected.len());
                    rendered.push(LlmMessage::user_with_parts(parts));
                    files_pending = false;
                }
                MessageRole::User => {
                    let mut text = message.content.clone();
                    if let Some(file_id) = message.file_id {
                        if !accepted.contains(&file_id) {
                            if let Some(file) = &entry.file {
                                let _ = write!(
                                    text,
                                    " [Referring to file: {}]",
                                    filename_from_key(&file.storage_key)
                                );
                            }
                        }
                    }
                    rendered.push(LlmMessage::user(text));
                }
                MessageRole::Assistant => {
                    rendered.push(LlmMessage::assistant(message.content.clone()));

                    if message.retrieval_mode == Some(RetrievalMode::Rag) {
                        let evidence = message.evidence();
                        if !evidence.is_empty() {
                            rendered.push(LlmMessage::system(evidence_block(evidence)));
                        }
                    }
                }
            }
        }

        let total_bytes: u64 = selected.iter().map(|f| f.size_bytes).sum();
        info!(
            "Built context: {} messages, {} inline files ({:.2} MB total)",
            rendered.len(),
            selected.len(),
            total_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok((rendered, accepted))
    }

    /// Download each unique inline file once; files over the per-file cap
    /// and files that fail to download are skipped.
    async fn collect_inline_files(
        &self,
        all_messages: &[MessageWithFile],
        inline_ids: &[Uuid],
    ) -> Vec<InlineFile> {
        let inline_set: HashSet<Uuid> = inline_ids.iter().copied().collect();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut collected = Vec::new();

        for entry in all_messages {
            let Some(file_id) = entry.message.file_id else {
                continue;
            };
            if !inline_set.contains(&file_id) || !seen.insert(file_id) {
                continue;
            }

            let Some(file) = &entry.file else {
                warn!("Inline file {} has no catalog record", file_id);
                continue;
            };

            let bytes = match self.blob.fetch(&file.storage_key).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to fetch inline file {}: {}", file_id, e);
                    continue;
                }
            };

            let size_bytes = bytes.len() as u64;
            if size_bytes > self.max_single_file_bytes {
                warn!(
                    "File {} ({} bytes) exceeds the per-file inline limit, skipping",
                    file_id, size_bytes
                );
                continue;
            }

            collected.push(InlineFile {
                file_id,
                filename: filename_from_key(&file.storage_key).to_string(),
                size_bytes,
                data_url: format!("data:application/pdf;base64,{}", BASE64.encode(&bytes)),
                first_mentioned_at: entry.message.created_at,
            });
        }

        collected
    }

    /// Newest-first greedy selection under the total inline budget.
    fn select_within_budget(&self, mut files: Vec<InlineFile>) -> Vec<InlineFile> {
        files.sort_by(|a, b| b.first_mentioned_at.cmp(&a.first_mentioned_at));

        let mut selected = Vec::new();
        let mut total: u64 = 0;

        for file in files {
            if total + file.size_bytes <= self.max_total_bytes {
                total += file.size_bytes;
                selected.push(file);
            } else {
                info!(
                    "Skipping file {} ({} bytes): would exceed the {} byte inline budget",
                    file.file_id, file.size_bytes, self.max_total_bytes
                );
            }
        }

        selected
    }
}

fn recent_messages(all_messages: &[MessageWithFile], max_messages: usize) -> &[MessageWithFile] {
    if all_messages.len() <= max_messages {
        all_messages
    } else {
        debug!(
            "Limiting conversation from {} to {} messages",
            all_messages.len(),
            max_messages
        );
        &all_messages[all_messages.len() - max_messages..]
    }
}

/// Evidence replayed after a stored rag-mode assistant message.
pub fn evidence_block(chunks: &[RetrievedChunk]) -> String {
    render_chunks(EVIDENCE_HEADER, chunks)
}

/// Evidence appended before the second LLM call of the current turn.
pub fn retrieved_block(chunks: &[RetrievedChunk]) -> String {
    render_chunks(RETRIEVED_HEADER, chunks)
}

fn render_chunks(header: &str, chunks: &[RetrievedChunk]) -> String {
    let mut parts = vec![header.to_string()];

    for (idx, chunk) in chunks.iter().enumerate() {
        if chunk.chunk_text.is_empty() {
            continue;
        }
        parts.push(format!(
            "\n[Chunk {}] (relevance: {:.1}%)\n{}",
            idx + 1,
            chunk.similarity_score * 100.0,
            chunk.chunk_text
        ));
    }

    parts.join("\n")
}
