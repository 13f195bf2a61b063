use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookIngestRequest {
    #[serde(default)]
    pub s3_bucket: Option<String>,
    pub s3_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub file_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub file_ids: Vec<Uuid>,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

/// Pagination for list endpoints; bounds are enforced in the handlers.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl ListParams {
    pub fn bounded(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}
