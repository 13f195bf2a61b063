use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::request::{ListParams, PresignRequest};
use crate::models::response::{
    FileDeleteResponse, FileDetailResponse, FileListResponse, FileResponse, PresignResponse,
};
use crate::state::AppState;
use crate::utils::error::ApiError;
use crate::utils::helpers::{storage_key_for, validate_upload_filename};

/// POST /presign — issue an upload URL. The catalog record is created later
/// by the ingestion webhook, not here.
pub async fn presign_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PresignRequest>,
) -> Result<Json<PresignResponse>, ApiError> {
    info!("Presign request for filename: {}", request.filename);
    validate_upload_filename(&request.filename)?;

    let file_id = Uuid::new_v4();
    let storage_key = storage_key_for(file_id);
    let presigned_url = state
        .blob
        .signed_put(&storage_key, state.presign_ttl_seconds)?;

    info!("Generated presigned upload URL for file {}", file_id);

    Ok(Json(PresignResponse {
        file_id,
        presigned_url,
        expires_in_seconds: state.presign_ttl_seconds,
    }))
}

/// GET /files — newest first, paginated.
pub async fn list_files_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<FileListResponse>, ApiError> {
    let (limit, offset) = params.bounded();

    let total = state.catalog.count_files().await?;
    let files = state.catalog.list_files(limit, offset).await?;

    Ok(Json(FileListResponse {
        files: files.into_iter().map(FileResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// GET /files/{id} — detail plus a presigned download URL.
pub async fn get_file_handler(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileDetailResponse>, ApiError> {
    let file = state
        .catalog
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::RecordNotFound(format!("File not found: {}", file_id)))?;

    let presigned_download_url = state
        .blob
        .signed_get(&file.storage_key, state.presign_ttl_seconds)?;

    Ok(Json(FileDetailResponse {
        file_id: file.id,
        storage_key: file.storage_key,
        ingestion_status: file.ingestion_status.as_str().to_string(),
        error_message: file.error_message,
        presigned_download_url,
        download_url_expires_in_seconds: state.presign_ttl_seconds,
        created_at: file.created_at,
        updated_at: file.updated_at,
    }))
}

/// DELETE /files/{id} — drop the catalog row (messages keep their text via
/// SET NULL) and clean the file's chunk vectors out of the index.
pub async fn delete_file_handler(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileDeleteResponse>, ApiError> {
    state
        .catalog
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::RecordNotFound(format!("File not found: {}", file_id)))?;

    let vectors_removed = match state.vectors.delete_by_file_id(file_id).await {
        Ok(count) => count,
        Err(e) => {
            // Vector cleanup is eventually consistent; the catalog delete
            // still proceeds.
            warn!("Vector cleanup for file {} failed: {}", file_id, e);
            0
        }
    };

    let deleted = state.catalog.delete_file(file_id).await?;
    info!(
        "Deleted file {} ({} vectors removed)",
        file_id, vectors_removed
    );

    Ok(Json(FileDeleteResponse {
        deleted,
        vectors_removed,
    }))
}
