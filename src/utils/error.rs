use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Domain error kinds. Adapters are the only place transport failures are
/// converted into these; everything above works in terms of `ApiError`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failure: {0}")]
    ValidationFailure(String),

    #[error("Invalid storage key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Not found: {0}")]
    RecordNotFound(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Blob access denied: {0}")]
    BlobAccessDenied(String),

    #[error("Blob store unavailable: {0}")]
    BlobUnavailable(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    #[error("Vector upsert failure: {0}")]
    VectorUpsertFailure(String),

    #[error("Vector query failure: {0}")]
    VectorQueryFailure(String),

    #[error("LLM failure: {0}")]
    LlmFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable kind string carried in the `error` field of every non-2xx body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::ValidationFailure(_) => "ValidationFailure",
            ApiError::InvalidKeyFormat(_) => "InvalidKeyFormat",
            ApiError::RecordNotFound(_) => "RecordNotFound",
            ApiError::BlobNotFound(_) => "BlobNotFound",
            ApiError::BlobAccessDenied(_) => "BlobAccessDenied",
            ApiError::BlobUnavailable(_) => "BlobUnavailable",
            ApiError::CatalogUnavailable(_) => "CatalogUnavailable",
            ApiError::ExtractionFailure(_) => "ExtractionFailure",
            ApiError::EmbeddingFailure(_) => "EmbeddingFailure",
            ApiError::VectorUpsertFailure(_) => "VectorUpsertFailure",
            ApiError::VectorQueryFailure(_) => "VectorQueryFailure",
            ApiError::LlmFailure(_) => "LLMFailure",
            ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ValidationFailure(_) | ApiError::InvalidKeyFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RecordNotFound(_) | ApiError::BlobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BlobAccessDenied(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BlobUnavailable(_)
            | ApiError::VectorUpsertFailure(_)
            | ApiError::VectorQueryFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::CatalogUnavailable(_)
            | ApiError::EmbeddingFailure(_)
            | ApiError::LlmFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ExtractionFailure(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn detail(&self) -> Value {
        match self {
            ApiError::InvalidKeyFormat(key) => json!({
                "storage_key": key,
                "expected": "uploads/<uuid>.pdf",
            }),
            ApiError::ExtractionFailure(_) => json!({
                "suggestion": "If this is a scanned PDF, OCR is required before ingestion",
            }),
            _ => json!({}),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    detail: Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{}", message);
        } else {
            tracing::warn!(kind = self.kind(), "{}", message);
        }

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
            detail: self.detail(),
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::RecordNotFound("record not found".to_string()),
            other => {
                tracing::error!("catalog error: {}", other);
                ApiError::CatalogUnavailable("catalog operation failed".to_string())
            }
        }
    }
}
