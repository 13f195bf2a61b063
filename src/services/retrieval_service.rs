use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::providers::{EmbeddingProvider, VectorProvider};
use crate::utils::error::ApiError;

/// One retrieved chunk with its provenance.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub file_id: Option<Uuid>,
    pub chunk_id: Option<Uuid>,
    pub chunk_text: String,
    pub similarity_score: f32,
}

/// Embeds a query with the ingestion embedder and searches the vector index
/// restricted to a set of files.
pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorProvider>,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, vectors: Arc<dyn VectorProvider>) -> Self {
        Self { embedder, vectors }
    }

    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        file_ids: &[Uuid],
    ) -> Result<Vec<SearchHit>, ApiError> {
        if file_ids.is_empty() {
            return Err(ApiError::ValidationFailure(
                "file_ids must not be empty for retrieval".to_string(),
            ));
        }

        info!(
            "Retrieval: top_k={}, file_ids={}, query_len={}",
            top_k,
            file_ids.len(),
            query_text.len()
        );

        let query_embedding = self.embedder.embed(query_text).await?;

        let matches = self
            .vectors
            .query(query_embedding, top_k, file_ids.to_vec())
            .await?;

        debug!("Retrieval returned {} matches", matches.len());

        Ok(matches
            .into_iter()
            .map(|m| {
                let (file_id, chunk_id, chunk_text) = match m.metadata {
                    Some(metadata) => (
                        Some(metadata.file_id),
                        Some(metadata.chunk_id),
                        metadata.chunk_text,
                    ),
                    None => (None, None, String::new()),
                };

                SearchHit {
                    file_id,
                    chunk_id,
                    chunk_text,
                    similarity_score: m.score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{
        ChunkMetadata, MockEmbeddingProvider, MockVectorProvider, VectorMatch,
    };

    #[tokio::test]
    async fn empty_file_ids_is_a_caller_bug() {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().times(0);

        let service = RetrievalService::new(Arc::new(embedder), Arc::new(MockVectorProvider::new()));
        let err = service.search("query", 5, &[]).await.unwrap_err();

        assert!(matches!(err, ApiError::ValidationFailure(_)));
    }

    #[tokio::test]
    async fn search_embeds_then_queries_with_file_filter() {
        let file_id = Uuid::new_v4();
        let chunk_id = Uuid::new_v4();

        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|_| Ok(vec![0.25; 4]));

        let mut vectors = MockVectorProvider::new();
        let expected_filter = vec![file_id];
        vectors
            .expect_query()
            .withf(move |vector, top_k, file_ids| {
                vector == &vec![0.25; 4] && *top_k == 3 && file_ids == &expected_filter
            })
            .times(1)
            .returning(move |_, _, _| {
                Ok(vec![VectorMatch {
                    id: chunk_id.to_string(),
                    score: 0.91,
                    metadata: Some(ChunkMetadata {
                        file_id,
                        chunk_id,
                        chunk_index: 2,
                        chunk_text: "relevant chunk".to_string(),
                    }),
                }])
            });

        let service = RetrievalService::new(Arc::new(embedder), Arc::new(vectors));
        let hits = service
            .search("what is this?", 3, &[file_id])
            .await
            .expect("search succeeds");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_text, "relevant chunk");
        assert_eq!(hits[0].similarity_score, 0.91);
        assert_eq!(hits[0].file_id, Some(file_id));
    }
}
