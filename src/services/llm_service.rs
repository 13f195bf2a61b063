use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::services::providers::{ContentPart, LlmContent, LlmMessage, LlmProvider, ToolsReply};
use crate::utils::error::ApiError;

/// Tool the model is told to call for any question answerable from the
/// uploaded documents.
pub fn semantic_search_tool() -> Value {
    json!({
        "type": "function",
        "name": "semantic_search",
        "description": "Search through uploaded PDF documents to find relevant information. \
            ALWAYS use this tool when the user asks questions that require information \
            from the uploaded documents. This includes questions about: document content, \
            specific topics mentioned in files, facts, data, recommendations, or any \
            details that would be in the PDFs. Examples: 'What does the document say \
            about...?', 'Find information about...', 'What is mentioned regarding...?', \
            'Summarize the section on...'",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant chunks from the documents"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of top chunks to retrieve (default: 5, max: 20)",
                    "default": 5,
                    "minimum": 1,
                    "maximum": 20
                }
            },
            "required": ["query"]
        }
    })
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    arguments: Option<String>,
    content: Option<Vec<OutputContent>>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

/// OpenAI Responses API adapter: plain completions and tool-enabled
/// completions over the same multi-turn input format.
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    async fn send(&self, payload: Value) -> Result<ResponsesBody, ApiError> {
        let url = format!("{}/v1/responses", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                warn!("LLM API transport error: {}", e);
                ApiError::LlmFailure("failed to reach LLM API".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API error ({}): {}", status, body);
            return Err(ApiError::LlmFailure(format!(
                "LLM API returned status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::LlmFailure(format!("malformed LLM response: {}", e)))
    }

    fn collect_text(body: &ResponsesBody) -> String {
        let mut text = String::new();
        for item in &body.output {
            if item.kind != "message" {
                continue;
            }
            if let Some(content) = &item.content {
                for part in content {
                    if part.kind == "output_text" {
                        if let Some(t) = &part.text {
                            text.push_str(t);
                        }
                    }
                }
            }
        }
        text
    }
}

/// Wire rendering for the Responses API `input` field.
pub fn render_input(messages: &[LlmMessage]) -> Value {
    let rendered: Vec<Value> = messages
        .iter()
        .map(|message| match &message.content {
            LlmContent::Text(text) => json!({
                "role": message.role,
                "content": text,
            }),
            LlmContent::Parts(parts) => {
                let rendered_parts: Vec<Value> = parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::InputFile { filename, data_url } => json!({
                            "type": "input_file",
                            "filename": filename,
                            "file_data": data_url,
                        }),
                        ContentPart::InputText { text } => json!({
                            "type": "input_text",
                            "text": text,
                        }),
                    })
                    .collect();
                json!({
                    "role": message.role,
                    "content": rendered_parts,
                })
            }
        })
        .collect();

    Value::Array(rendered)
}

#[async_trait]
impl LlmProvider for LlmService {
    async fn complete(&self, messages: Vec<LlmMessage>) -> Result<String, ApiError> {
        debug!(
            "Sending chat request (model: {}, {} messages)",
            self.config.model,
            messages.len()
        );

        let body = self
            .send(json!({
                "model": self.config.model,
                "input": render_input(&messages),
            }))
            .await?;

        let text = Self::collect_text(&body);
        if text.trim().is_empty() {
            return Err(ApiError::LlmFailure("LLM returned an empty response".to_string()));
        }

        debug!("Received LLM response ({} chars)", text.len());
        Ok(text)
    }

    async fn complete_with_tools(
        &self,
        messages: Vec<LlmMessage>,
        tools: Vec<Value>,
    ) -> Result<ToolsReply, ApiError> {
        debug!(
            "Sending tool-enabled chat request (model: {}, {} messages, {} tools)",
            self.config.model,
            messages.len(),
            tools.len()
        );

        let body = self
            .send(json!({
                "model": self.config.model,
                "input": render_input(&messages),
                "tools": tools,
            }))
            .await?;

        for item in &body.output {
            if item.kind == "function_call" {
                let name = item.name.clone().unwrap_or_default();
                let arguments: Value = match &item.arguments {
                    Some(raw) => serde_json::from_str(raw).map_err(|e| {
                        ApiError::LlmFailure(format!("unparseable tool arguments: {}", e))
                    })?,
                    None => json!({}),
                };

                info!("LLM called tool: {}", name);
                return Ok(ToolsReply::ToolCall { name, arguments });
            }
        }

        let text = Self::collect_text(&body);
        debug!("LLM responded directly ({} chars)", text.len());
        Ok(ToolsReply::Text(text))
    }
}
