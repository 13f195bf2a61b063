use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::models::request::RetrieveRequest;
use crate::models::response::{RetrieveResponse, RetrieveResult};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /retrieve — debug endpoint for exercising the retrieval pipeline
/// independently of chat. Embed/query failures are the caller's 400 here
/// (bad credentials, bad namespace), unlike the chat path where they 5xx.
pub async fn retrieve_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, Response> {
    info!(
        "Retrieve request: file_ids={}, top_k={}",
        request.file_ids.len(),
        request.top_k
    );

    if request.query.trim().is_empty() {
        return Err(
            ApiError::ValidationFailure("Query must not be empty".to_string()).into_response(),
        );
    }

    let top_k = request.top_k.clamp(1, 20);

    let hits = state
        .retrieval
        .search(&request.query, top_k, &request.file_ids)
        .await
        .map_err(|err| match err {
            ApiError::EmbeddingFailure(_) | ApiError::VectorQueryFailure(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": err.kind(),
                    "message": err.to_string(),
                    "detail": {
                        "suggestion": "Check provider credentials and the vector namespace",
                    },
                })),
            )
                .into_response(),
            other => other.into_response(),
        })?;

    if hits.is_empty() {
        return Err(
            ApiError::RecordNotFound("No results found for query".to_string()).into_response(),
        );
    }

    info!("Retrieval successful: {} chunks", hits.len());

    Ok(Json(RetrieveResponse {
        results: hits
            .into_iter()
            .map(|hit| RetrieveResult {
                file_id: hit.file_id,
                chunk_id: hit.chunk_id,
                chunk_text: hit.chunk_text,
                similarity_score: hit.similarity_score,
            })
            .collect(),
    }))
}
