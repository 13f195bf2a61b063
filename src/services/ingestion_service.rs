use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::IngestionStatus;
use crate::document::{clean_text, extract_pdf_text, TokenChunker};
use crate::services::providers::{
    BlobProvider, CatalogProvider, ChunkMetadata, EmbeddingProvider, VectorEntry, VectorProvider,
};
use crate::utils::error::ApiError;
use crate::utils::helpers::file_id_from_storage_key;

/// Result of handling one ingestion trigger. `already_existed` marks the
/// idempotent path: nothing was downloaded, embedded, or upserted.
#[derive(Debug)]
pub struct IngestOutcome {
    pub file_id: Uuid,
    pub status: IngestionStatus,
    pub already_existed: bool,
    pub chunks_created: usize,
    pub vectors_upserted: usize,
    pub error_message: Option<String>,
}

/// Webhook-triggered pipeline: download → extract → clean → chunk → embed →
/// upsert → status. Content failures mark the file `failed` instead of
/// surfacing as HTTP errors.
pub struct IngestionService {
    catalog: Arc<dyn CatalogProvider>,
    blob: Arc<dyn BlobProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorProvider>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl IngestionService {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        blob: Arc<dyn BlobProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorProvider>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            catalog,
            blob,
            embedder,
            vectors,
            chunk_size,
            chunk_overlap,
        }
    }

    pub async fn ingest(&self, storage_key: &str) -> Result<IngestOutcome, ApiError> {
        let file_id = file_id_from_storage_key(storage_key)?;
        info!("Ingestion triggered for file {} ({})", file_id, storage_key);

        if let Some(existing) = self.catalog.get_file(file_id).await? {
            info!(
                "File {} already exists with status '{}', skipping ingestion",
                file_id,
                existing.ingestion_status.as_str()
            );
            return Ok(IngestOutcome {
                file_id,
                status: existing.ingestion_status,
                already_existed: true,
                chunks_created: 0,
                vectors_upserted: 0,
                error_message: existing.error_message,
            });
        }

        self.catalog.create_file(file_id, storage_key).await?;

        match self.process(file_id, storage_key).await {
            Ok((chunks_created, vectors_upserted)) => {
                self.catalog
                    .update_file_status(file_id, IngestionStatus::Completed, None)
                    .await?;

                info!(
                    "Ingestion completed for file {}: {} chunks, {} vectors",
                    file_id, chunks_created, vectors_upserted
                );

                Ok(IngestOutcome {
                    file_id,
                    status: IngestionStatus::Completed,
                    already_existed: false,
                    chunks_created,
                    vectors_upserted,
                    error_message: None,
                })
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Ingestion failed for file {}: {}", file_id, message);

                self.catalog
                    .update_file_status(file_id, IngestionStatus::Failed, Some(message.clone()))
                    .await?;

                // Chunk ids are stable per (file_id, chunk_index), so a
                // re-delivered trigger would overwrite leftovers anyway;
                // cleanup here is best-effort.
                if let Err(cleanup_err) = self.vectors.delete_by_file_id(file_id).await {
                    warn!(
                        "Best-effort vector cleanup for file {} failed: {}",
                        file_id, cleanup_err
                    );
                }

                Ok(IngestOutcome {
                    file_id,
                    status: IngestionStatus::Failed,
                    already_existed: false,
                    chunks_created: 0,
                    vectors_upserted: 0,
                    error_message: Some(message),
                })
            }
        }
    }

    async fn process(&self, file_id: Uuid, storage_key: &str) -> Result<(usize, usize), ApiError> {
        let pdf_bytes = self.blob.fetch(storage_key).await?;

        let chunk_size = self.chunk_size;
        let chunk_overlap = self.chunk_overlap;

        // Extraction and chunking are CPU-bound; keep them off the runtime.
        let chunks = tokio::task::spawn_blocking(move || {
            let extracted = extract_pdf_text(&pdf_bytes)?;
            let cleaned = clean_text(&extracted.text);

            let chunker = TokenChunker::new(chunk_size, chunk_overlap)?;
            chunker.chunk(&cleaned)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("extraction task panicked: {}", e)))??;

        if chunks.is_empty() {
            return Err(ApiError::ExtractionFailure(
                "No text found in PDF. This may be a scanned PDF requiring OCR.".to_string(),
            ));
        }

        info!("Created {} chunks for file {}", chunks.len(), file_id);

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(texts).await?;

        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| {
                let chunk_id = stable_chunk_id(file_id, chunk.index);
                VectorEntry {
                    id: chunk_id,
                    vector,
                    metadata: ChunkMetadata {
                        file_id,
                        chunk_id,
                        chunk_index: chunk.index,
                        chunk_text: chunk.text.clone(),
                    },
                }
            })
            .collect();

        let chunks_created = chunks.len();
        let vectors_upserted = self.vectors.upsert(entries).await?;

        Ok((chunks_created, vectors_upserted))
    }
}

/// Chunk vector id derived from (file_id, chunk_index). Re-ingesting the
/// same file upserts over the same ids instead of duplicating vectors.
pub fn stable_chunk_id(file_id: Uuid, chunk_index: usize) -> Uuid {
    Uuid::new_v5(&file_id, format!("chunk-{}", chunk_index).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::FileRecord;
    use crate::services::providers::{
        MockBlobProvider, MockCatalogProvider, MockEmbeddingProvider, MockVectorProvider,
    };
    use chrono::Utc;
    use mockall::predicate::eq;

    const KEY: &str = "uploads/cacc19ff-21f8-4894-bd24-ca93d8c4de4a.pdf";

    fn file_id() -> Uuid {
        Uuid::parse_str("cacc19ff-21f8-4894-bd24-ca93d8c4de4a").unwrap()
    }

    fn file_record(status: IngestionStatus) -> FileRecord {
        FileRecord {
            id: file_id(),
            storage_key: KEY.to_string(),
            ingestion_status: status,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(
        catalog: MockCatalogProvider,
        blob: MockBlobProvider,
        embedder: MockEmbeddingProvider,
        vectors: MockVectorProvider,
    ) -> IngestionService {
        IngestionService::new(
            Arc::new(catalog),
            Arc::new(blob),
            Arc::new(embedder),
            Arc::new(vectors),
            512,
            100,
        )
    }

    #[tokio::test]
    async fn invalid_key_is_rejected_before_any_catalog_access() {
        let service = service(
            MockCatalogProvider::new(),
            MockBlobProvider::new(),
            MockEmbeddingProvider::new(),
            MockVectorProvider::new(),
        );

        let err = service.ingest("pdfs/not-a-uuid.pdf").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidKeyFormat(_)));
    }

    #[tokio::test]
    async fn existing_file_short_circuits_idempotently() {
        let mut catalog = MockCatalogProvider::new();
        catalog
            .expect_get_file()
            .with(eq(file_id()))
            .times(1)
            .returning(|_| Ok(Some(file_record(IngestionStatus::Completed))));
        // No create, no status updates.
        catalog.expect_create_file().times(0);
        catalog.expect_update_file_status().times(0);

        let mut blob = MockBlobProvider::new();
        blob.expect_fetch().times(0);
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed_batch().times(0);
        let mut vectors = MockVectorProvider::new();
        vectors.expect_upsert().times(0);

        let outcome = service(catalog, blob, embedder, vectors)
            .ingest(KEY)
            .await
            .expect("idempotent path succeeds");

        assert!(outcome.already_existed);
        assert_eq!(outcome.status, IngestionStatus::Completed);
        assert_eq!(outcome.chunks_created, 0);
    }

    #[tokio::test]
    async fn blob_failure_marks_file_failed_and_acknowledges() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_get_file().returning(|_| Ok(None));
        catalog
            .expect_create_file()
            .times(1)
            .returning(|id, key| {
                assert_eq!(id, file_id());
                assert_eq!(key, KEY);
                Ok(file_record(IngestionStatus::Uploaded))
            });
        catalog
            .expect_update_file_status()
            .withf(|_, status, message| {
                *status == IngestionStatus::Failed && message.is_some()
            })
            .times(1)
            .returning(|_, _, _| Ok(Some(file_record(IngestionStatus::Failed))));

        let mut blob = MockBlobProvider::new();
        blob.expect_fetch()
            .returning(|key| Err(ApiError::BlobNotFound(key.to_string())));

        let mut vectors = MockVectorProvider::new();
        vectors
            .expect_delete_by_file_id()
            .with(eq(file_id()))
            .times(1)
            .returning(|_| Ok(0));

        let outcome = service(catalog, blob, MockEmbeddingProvider::new(), vectors)
            .ingest(KEY)
            .await
            .expect("content failures are acknowledged, not surfaced");

        assert_eq!(outcome.status, IngestionStatus::Failed);
        assert!(outcome.error_message.is_some());
    }

    #[tokio::test]
    async fn embedding_failure_marks_file_failed() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_get_file().returning(|_| Ok(None));
        catalog
            .expect_create_file()
            .returning(|_, _| Ok(file_record(IngestionStatus::Uploaded)));
        catalog
            .expect_update_file_status()
            .withf(|_, status, _| *status == IngestionStatus::Failed)
            .times(1)
            .returning(|_, _, _| Ok(Some(file_record(IngestionStatus::Failed))));

        let mut blob = MockBlobProvider::new();
        blob.expect_fetch()
            .returning(|_| Ok(test_pdf::one_page("some extractable text")));

        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed_batch()
            .returning(|_| Err(ApiError::EmbeddingFailure("rate limited".to_string())));

        let mut vectors = MockVectorProvider::new();
        vectors.expect_upsert().times(0);
        vectors.expect_delete_by_file_id().returning(|_| Ok(0));

        let outcome = service(catalog, blob, embedder, vectors)
            .ingest(KEY)
            .await
            .expect("failure path acknowledges");

        assert_eq!(outcome.status, IngestionStatus::Failed);
    }

    #[tokio::test]
    async fn successful_ingestion_upserts_one_vector_per_chunk() {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_get_file().returning(|_| Ok(None));
        catalog
            .expect_create_file()
            .returning(|_, _| Ok(file_record(IngestionStatus::Uploaded)));
        catalog
            .expect_update_file_status()
            .withf(|_, status, message| {
                *status == IngestionStatus::Completed && message.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(Some(file_record(IngestionStatus::Completed))));

        let mut blob = MockBlobProvider::new();
        blob.expect_fetch()
            .returning(|_| Ok(test_pdf::one_page("alpha beta gamma delta epsilon")));

        let mut embedder = MockEmbeddingProvider::new();
        embedder
            .expect_embed_batch()
            .returning(|texts| Ok(vec![vec![0.5; 4]; texts.len()]));

        let mut vectors = MockVectorProvider::new();
        vectors
            .expect_upsert()
            .withf(|entries| {
                // chunk_index unique, covering 0..N, with stable v5 ids.
                entries.iter().enumerate().all(|(i, entry)| {
                    entry.metadata.chunk_index == i
                        && entry.id == stable_chunk_id(file_id(), i)
                        && entry.metadata.chunk_id == entry.id
                        && entry.metadata.file_id == file_id()
                })
            })
            .times(1)
            .returning(|entries| Ok(entries.len()));

        let outcome = service(catalog, blob, embedder, vectors)
            .ingest(KEY)
            .await
            .expect("ingestion succeeds");

        assert_eq!(outcome.status, IngestionStatus::Completed);
        assert!(!outcome.already_existed);
        assert!(outcome.chunks_created >= 1);
        assert_eq!(outcome.vectors_upserted, outcome.chunks_created);
    }

    #[test]
    fn stable_chunk_ids_are_deterministic_and_distinct() {
        let a = stable_chunk_id(file_id(), 0);
        let b = stable_chunk_id(file_id(), 0);
        let c = stable_chunk_id(file_id(), 1);
        let other = stable_chunk_id(Uuid::new_v4(), 0);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, other);
    }

    /// Minimal in-memory PDFs for pipeline tests.
    mod test_pdf {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        pub fn one_page(text: &str) -> Vec<u8> {
            let mut doc = Document::with_version("1.5");
            let pages_id = doc.new_object_id();
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            });
            let resources_id = doc.add_object(dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            });
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("content encodes"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            doc.objects.insert(
                pages_id,
                Object::Dictionary(dictionary! {
                    "Type" => "Pages",
                    "Kids" => vec![page_id.into()],
                    "Count" => 1,
                    "Resources" => resources_id,
                    "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                }),
            );
            let catalog_id = doc.add_object(dictionary! {
                "Type" => "Catalog",
                "Pages" => pages_id,
            });
            doc.trailer.set("Root", catalog_id);

            let mut buf = Vec::new();
            doc.save_to(&mut buf).expect("pdf serializes");
            buf
        }
    }
}
