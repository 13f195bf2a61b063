use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

use crate::database::IngestionStatus;
use crate::models::request::WebhookIngestRequest;
use crate::models::response::{IngestResponse, IngestSummary};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /webhook/ingest — blob-store upload notification. Runs the full
/// ingestion pipeline synchronously. Content failures (scanned PDF, corrupt
/// file) acknowledge with 200 and `status: "failed"`; only a malformed key
/// is the caller's error.
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WebhookIngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    info!(
        "Received ingest notification: bucket={:?}, key={}",
        request.s3_bucket, request.s3_key
    );

    let outcome = state.ingestion.ingest(&request.s3_key).await?;

    let (status, message, summary) = if outcome.already_existed {
        (
            "success",
            "File already exists".to_string(),
            None,
        )
    } else {
        match outcome.status {
            IngestionStatus::Failed => (
                "failed",
                outcome
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Ingestion failed".to_string()),
                None,
            ),
            _ => (
                "success",
                "File ingested successfully".to_string(),
                Some(IngestSummary {
                    chunks_created: outcome.chunks_created,
                    vectors_upserted: outcome.vectors_upserted,
                }),
            ),
        }
    };

    Ok(Json(IngestResponse {
        status: status.to_string(),
        message,
        file_id: outcome.file_id,
        ingestion_status: outcome.status.as_str().to_string(),
        summary,
    }))
}
