pub mod sigv4;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::BlobConfig;
use crate::services::providers::BlobProvider;
use crate::utils::error::ApiError;
use sigv4::{presign_url, PresignRequest};

/// S3-compatible blob store. Presigned URLs are computed locally; `fetch`
/// downloads through a short-lived presigned GET.
pub struct BlobStore {
    client: Client,
    config: BlobConfig,
    host: String,
}

impl BlobStore {
    pub fn new(config: BlobConfig) -> Self {
        let host = format!("{}.s3.{}.amazonaws.com", config.bucket, config.region);

        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
            host,
        }
    }

    fn presign(&self, method: &str, key: &str, ttl_seconds: u64) -> String {
        presign_url(&PresignRequest {
            method,
            host: &self.host,
            key,
            region: &self.config.region,
            access_key_id: &self.config.credentials_access_key_id,
            secret_access_key: &self.config.credentials_secret_access_key,
            expires_in_seconds: ttl_seconds,
            now: Utc::now(),
        })
    }
}

#[async_trait]
impl BlobProvider for BlobStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, ApiError> {
        debug!("Fetching blob: {}", key);

        let url = self.presign("GET", key, self.config.presign_ttl_seconds);

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!("Blob fetch transport error for {}: {}", key, e);
            ApiError::BlobUnavailable(format!("blob fetch failed for {}", key))
        })?;

        match response.status().as_u16() {
            404 => return Err(ApiError::BlobNotFound(key.to_string())),
            403 => return Err(ApiError::BlobAccessDenied(key.to_string())),
            s if s >= 400 => {
                warn!("Blob fetch for {} returned status {}", key, s);
                return Err(ApiError::BlobUnavailable(format!(
                    "blob store returned status {} for {}",
                    s, key
                )));
            }
            _ => {}
        }

        let bytes = response.bytes().await.map_err(|e| {
            warn!("Blob body read error for {}: {}", key, e);
            ApiError::BlobUnavailable(format!("blob read failed for {}", key))
        })?;

        debug!("Fetched blob {} ({} bytes)", key, bytes.len());
        Ok(bytes.to_vec())
    }

    fn signed_put(&self, key: &str, ttl_seconds: u64) -> Result<String, ApiError> {
        Ok(self.presign("PUT", key, ttl_seconds))
    }

    fn signed_get(&self, key: &str, ttl_seconds: u64) -> Result<String, ApiError> {
        Ok(self.presign("GET", key, ttl_seconds))
    }
}
