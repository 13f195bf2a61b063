use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::utils::error::ApiError;

static STORAGE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^uploads/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.pdf$",
    )
    .expect("storage key regex is valid")
});

const INVALID_FILENAME_CHARS: [char; 9] = ['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// Extract the file id from a storage key of the form `uploads/<uuid>.pdf`.
/// Matching is case-insensitive; anything else is an `InvalidKeyFormat`.
pub fn file_id_from_storage_key(storage_key: &str) -> Result<Uuid, ApiError> {
    let captures = STORAGE_KEY_RE
        .captures(storage_key)
        .ok_or_else(|| ApiError::InvalidKeyFormat(storage_key.to_string()))?;

    Uuid::parse_str(&captures[1]).map_err(|_| ApiError::InvalidKeyFormat(storage_key.to_string()))
}

/// Canonical storage key for a file id (lowercase uuid, `uploads/` prefix).
pub fn storage_key_for(file_id: Uuid) -> String {
    format!("uploads/{}.pdf", file_id)
}

/// Last path segment of a storage key, shown to users and to the model.
pub fn filename_from_key(storage_key: &str) -> &str {
    storage_key.rsplit('/').next().unwrap_or(storage_key)
}

/// Upload filename rules: 1..255 chars, `.pdf` suffix (case-insensitive),
/// none of the characters that break S3 keys or local tooling.
pub fn validate_upload_filename(filename: &str) -> Result<(), ApiError> {
    if filename.is_empty() || filename.len() > 255 {
        return Err(ApiError::ValidationFailure(
            "Filename must be between 1 and 255 characters".to_string(),
        ));
    }

    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(ApiError::ValidationFailure(
            "Only PDF files are allowed. Filename must end with .pdf".to_string(),
        ));
    }

    if filename.chars().any(|c| INVALID_FILENAME_CHARS.contains(&c)) {
        return Err(ApiError::ValidationFailure(format!(
            "Filename contains invalid characters: {:?}",
            INVALID_FILENAME_CHARS
        )));
    }

    Ok(())
}
