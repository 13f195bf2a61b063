use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VectorConfig;
use crate::services::providers::{ChunkMetadata, VectorEntry, VectorMatch, VectorProvider};
use crate::utils::error::ApiError;

// High enough to cover every chunk of one file when collecting ids for
// cleanup; the index caps result sizes itself.
const DELETE_SCAN_TOP_K: usize = 10000;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    id: String,
    score: f32,
    metadata: Option<ChunkMetadata>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    result: DeleteResult,
}

#[derive(Debug, Deserialize)]
struct DeleteResult {
    deleted: usize,
}

/// REST vector index adapter (Upstash-style API): namespace-scoped
/// upsert/query/delete with a metadata filter expression for file scoping.
pub struct VectorService {
    client: Client,
    base_url: String,
    token: String,
    namespace: String,
    dimension: usize,
}

impl VectorService {
    pub fn new(config: &VectorConfig, dimension: usize) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            namespace: config.namespace.clone(),
            dimension,
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}/{}", self.base_url, operation, self.namespace)
    }

    /// Set-membership filter over the `file_id` metadata field.
    fn file_filter(file_ids: &[Uuid]) -> Option<String> {
        match file_ids {
            [] => None,
            [single] => Some(format!("file_id = '{}'", single)),
            many => {
                let quoted: Vec<String> = many.iter().map(|id| format!("'{}'", id)).collect();
                Some(format!("file_id IN ({})", quoted.join(", ")))
            }
        }
    }

    async fn post(&self, url: &str, body: Value, op: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Vector index transport error during {}: {}", op, e);
                match op {
                    "query" => ApiError::VectorQueryFailure("failed to reach vector index".to_string()),
                    _ => ApiError::VectorUpsertFailure("failed to reach vector index".to_string()),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            warn!("Vector index {} error ({}): {}", op, status, body_text);
            return Err(match op {
                "query" => ApiError::VectorQueryFailure(format!(
                    "vector index returned status {}",
                    status
                )),
                _ => ApiError::VectorUpsertFailure(format!(
                    "vector index returned status {}",
                    status
                )),
            });
        }

        Ok(response)
    }

    async fn query_with_filter(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        filter: Option<String>,
        include_metadata: bool,
    ) -> Result<Vec<VectorMatch>, ApiError> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": include_metadata,
        });
        if let Some(filter) = filter {
            body["filter"] = Value::String(filter);
        }

        let response = self.post(&self.endpoint("query"), body, "query").await?;

        let parsed: QueryResponse = response.json().await.map_err(|e| {
            ApiError::VectorQueryFailure(format!("malformed query response: {}", e))
        })?;

        Ok(parsed
            .result
            .into_iter()
            .map(|r| VectorMatch {
                id: r.id,
                score: r.score,
                metadata: r.metadata,
            })
            .collect())
    }
}

#[async_trait]
impl VectorProvider for VectorService {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<usize, ApiError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let count = entries.len();
        debug!(
            "Upserting {} vectors to namespace '{}'",
            count, self.namespace
        );

        let body: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "vector": entry.vector,
                    "metadata": entry.metadata,
                })
            })
            .collect();

        self.post(&self.endpoint("upsert"), Value::Array(body), "upsert")
            .await?;

        info!(
            "Upserted {} vectors to namespace '{}'",
            count, self.namespace
        );
        Ok(count)
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        file_ids: Vec<Uuid>,
    ) -> Result<Vec<VectorMatch>, ApiError> {
        debug!(
            "Querying vectors: top_k={}, file_ids={}, namespace='{}'",
            top_k,
            file_ids.len(),
            self.namespace
        );

        let matches = self
            .query_with_filter(vector, top_k, Self::file_filter(&file_ids), true)
            .await?;

        debug!("Query returned {} results", matches.len());
        Ok(matches)
    }

    async fn delete(&self, ids: Vec<String>) -> Result<usize, ApiError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let response = self
            .post(&self.endpoint("delete"), json!({ "ids": ids }), "delete")
            .await?;

        let parsed: DeleteResponse = response.json().await.map_err(|e| {
            ApiError::VectorUpsertFailure(format!("malformed delete response: {}", e))
        })?;

        Ok(parsed.result.deleted)
    }

    /// The index has no delete-by-metadata call, so collect ids with a
    /// filtered scan first, then delete them.
    async fn delete_by_file_id(&self, file_id: Uuid) -> Result<usize, ApiError> {
        info!(
            "Deleting vectors for file {} in namespace '{}'",
            file_id, self.namespace
        );

        let matches = self
            .query_with_filter(
                vec![0.0; self.dimension],
                DELETE_SCAN_TOP_K,
                Self::file_filter(&[file_id]),
                false,
            )
            .await?;

        if matches.is_empty() {
            debug!("No vectors found for file {}", file_id);
            return Ok(0);
        }

        let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
        let deleted = self.delete(ids).await?;

        info!("Deleted {} vectors for file {}", deleted, file_id);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn service(base_url: String) -> VectorService {
        VectorService::new(
            &VectorConfig {
                url: base_url,
                token: "vector-token".to_string(),
                namespace: "testing".to_string(),
                timeout_seconds: 5,
            },
            4,
        )
    }

    #[test]
    fn filter_for_single_file_uses_equality() {
        let id = Uuid::parse_str("cacc19ff-21f8-4894-bd24-ca93d8c4de4a").unwrap();
        assert_eq!(
            VectorService::file_filter(&[id]).unwrap(),
            "file_id = 'cacc19ff-21f8-4894-bd24-ca93d8c4de4a'"
        );
    }

    #[test]
    fn filter_for_many_files_uses_set_membership() {
        let a = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
        let b = Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap();
        assert_eq!(
            VectorService::file_filter(&[a, b]).unwrap(),
            "file_id IN ('11111111-1111-1111-1111-111111111111', \
             '22222222-2222-2222-2222-222222222222')"
        );
    }

    #[test]
    fn no_filter_without_file_ids() {
        assert!(VectorService::file_filter(&[]).is_none());
    }

    #[tokio::test]
    async fn query_sends_filter_and_parses_matches() {
        let server = MockServer::start_async().await;
        let file_id = Uuid::parse_str("cacc19ff-21f8-4894-bd24-ca93d8c4de4a").unwrap();

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/query/testing").json_body(json!({
                    "vector": [0.1, 0.2, 0.3, 0.4],
                    "topK": 5,
                    "includeMetadata": true,
                    "filter": "file_id = 'cacc19ff-21f8-4894-bd24-ca93d8c4de4a'",
                }));
                then.status(200).json_body(json!({
                    "result": [{
                        "id": "chunk-1",
                        "score": 0.92,
                        "metadata": {
                            "file_id": "cacc19ff-21f8-4894-bd24-ca93d8c4de4a",
                            "chunk_id": "11111111-1111-1111-1111-111111111111",
                            "chunk_index": 0,
                            "chunk_text": "Machine learning is..."
                        }
                    }]
                }));
            })
            .await;

        let matches = service(server.base_url())
            .query(vec![0.1, 0.2, 0.3, 0.4], 5, vec![file_id])
            .await
            .expect("query succeeds");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 0.92);
        let metadata = matches[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.file_id, file_id);
        assert_eq!(metadata.chunk_text, "Machine learning is...");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upsert_posts_all_entries_in_one_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/upsert/testing");
                then.status(200).json_body(json!({"result": "Success"}));
            })
            .await;

        let file_id = Uuid::new_v4();
        let entries: Vec<VectorEntry> = (0..3)
            .map(|i| {
                let chunk_id = Uuid::new_v4();
                VectorEntry {
                    id: chunk_id,
                    vector: vec![0.0, 0.1, 0.2, 0.3],
                    metadata: ChunkMetadata {
                        file_id,
                        chunk_id,
                        chunk_index: i,
                        chunk_text: format!("chunk {}", i),
                    },
                }
            })
            .collect();

        let count = service(server.base_url())
            .upsert(entries)
            .await
            .expect("upsert succeeds");

        assert_eq!(count, 3);
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn query_failure_maps_to_vector_query_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query/testing");
                then.status(500).body("index down");
            })
            .await;

        let err = service(server.base_url())
            .query(vec![0.0; 4], 5, vec![Uuid::new_v4()])
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::VectorQueryFailure(_)));
    }
}
