use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{IngestionStatus, MessageWithFile};
use crate::services::providers::CatalogProvider;
use crate::utils::error::ApiError;

/// Disjoint partition of the conversation's files by ingestion status, in
/// first-mention order.
#[derive(Debug, Default)]
pub struct ClassifiedFiles {
    pub inline_ids: Vec<Uuid>,
    pub rag_ids: Vec<Uuid>,
    pub failed: usize,
    pub not_found: usize,
}

/// Categorize every file referenced by the conversation: `uploaded` files go
/// inline, `completed` files go to RAG, `failed` and missing files are
/// skipped. First occurrence wins. Relies on eagerly loaded file records;
/// the only lookup performed is for a new file id not yet in the stream.
pub async fn classify_files(
    messages: &[MessageWithFile],
    catalog: &dyn CatalogProvider,
    new_file_id: Option<Uuid>,
) -> Result<ClassifiedFiles, ApiError> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut classified = ClassifiedFiles::default();

    for entry in messages {
        let Some(file_id) = entry.message.file_id else {
            continue;
        };
        if !seen.insert(file_id) {
            continue;
        }

        match &entry.file {
            None => {
                warn!("File not found in relationship: {}", file_id);
                classified.not_found += 1;
            }
            Some(file) => categorize(&mut classified, file_id, file.ingestion_status, file.error_message.as_deref()),
        }
    }

    if let Some(file_id) = new_file_id {
        if seen.insert(file_id) {
            match catalog.get_file(file_id).await? {
                None => {
                    warn!("New file not found in catalog: {}", file_id);
                    classified.not_found += 1;
                }
                Some(file) => categorize(
                    &mut classified,
                    file_id,
                    file.ingestion_status,
                    file.error_message.as_deref(),
                ),
            }
        }
    }

    info!(
        "File classification complete: {} inline, {} RAG, {} failed, {} not found",
        classified.inline_ids.len(),
        classified.rag_ids.len(),
        classified.failed,
        classified.not_found
    );

    Ok(classified)
}

fn categorize(
    classified: &mut ClassifiedFiles,
    file_id: Uuid,
    status: IngestionStatus,
    error_message: Option<&str>,
) {
    match status {
        IngestionStatus::Uploaded => {
            debug!("File {} -> inline (status: uploaded)", file_id);
            classified.inline_ids.push(file_id);
        }
        IngestionStatus::Completed => {
            debug!("File {} -> RAG (status: completed)", file_id);
            classified.rag_ids.push(file_id);
        }
        IngestionStatus::Failed => {
            warn!(
                "File {} skipped (status: failed, error: {})",
                file_id,
                error_message.unwrap_or("unknown")
            );
            classified.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{FileRecord, MessageRecord, MessageRole};
    use crate::services::providers::MockCatalogProvider;
    use chrono::Utc;
    use mockall::predicate::eq;

    fn file(id: Uuid, status: IngestionStatus) -> FileRecord {
        FileRecord {
            id,
            storage_key: format!("uploads/{}.pdf", id),
            ingestion_status: status,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message(file: Option<FileRecord>) -> MessageWithFile {
        MessageWithFile {
            message: MessageRecord {
                id: Uuid::new_v4(),
                conversation_id: Uuid::new_v4(),
                role: MessageRole::User,
                content: "question".to_string(),
                file_id: file.as_ref().map(|f| f.id),
                retrieval_mode: None,
                retrieved_chunks: None,
                created_at: Utc::now(),
            },
            file,
        }
    }

    fn orphan_message(file_id: Uuid) -> MessageWithFile {
        let mut entry = message(None);
        entry.message.file_id = Some(file_id);
        entry
    }

    #[tokio::test]
    async fn partitions_by_ingestion_status() {
        let uploaded = Uuid::new_v4();
        let completed = Uuid::new_v4();
        let failed = Uuid::new_v4();

        let messages = vec![
            message(Some(file(uploaded, IngestionStatus::Uploaded))),
            message(Some(file(completed, IngestionStatus::Completed))),
            message(Some(file(failed, IngestionStatus::Failed))),
            message(None),
        ];

        let catalog = MockCatalogProvider::new();
        let classified = classify_files(&messages, &catalog, None).await.unwrap();

        assert_eq!(classified.inline_ids, vec![uploaded]);
        assert_eq!(classified.rag_ids, vec![completed]);
        assert_eq!(classified.failed, 1);
        assert_eq!(classified.not_found, 0);
    }

    #[tokio::test]
    async fn no_file_appears_in_both_lists() {
        let ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let messages: Vec<MessageWithFile> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let status = if i % 2 == 0 {
                    IngestionStatus::Uploaded
                } else {
                    IngestionStatus::Completed
                };
                message(Some(file(*id, status)))
            })
            .collect();

        let catalog = MockCatalogProvider::new();
        let classified = classify_files(&messages, &catalog, None).await.unwrap();

        for id in &classified.inline_ids {
            assert!(!classified.rag_ids.contains(id));
        }
        assert_eq!(
            classified.inline_ids.len() + classified.rag_ids.len(),
            ids.len()
        );
    }

    #[tokio::test]
    async fn first_occurrence_wins_for_repeated_references() {
        let id = Uuid::new_v4();
        let messages = vec![
            message(Some(file(id, IngestionStatus::Completed))),
            message(Some(file(id, IngestionStatus::Completed))),
            message(Some(file(id, IngestionStatus::Completed))),
        ];

        let catalog = MockCatalogProvider::new();
        let classified = classify_files(&messages, &catalog, None).await.unwrap();

        assert_eq!(classified.rag_ids, vec![id]);
    }

    #[tokio::test]
    async fn new_file_id_is_fetched_once_and_categorized() {
        let new_id = Uuid::new_v4();

        let mut catalog = MockCatalogProvider::new();
        catalog
            .expect_get_file()
            .with(eq(new_id))
            .times(1)
            .returning(move |id| Ok(Some(file(id, IngestionStatus::Uploaded))));

        let classified = classify_files(&[], &catalog, Some(new_id)).await.unwrap();

        assert_eq!(classified.inline_ids, vec![new_id]);
    }

    #[tokio::test]
    async fn new_file_already_in_stream_is_not_refetched() {
        let id = Uuid::new_v4();
        let messages = vec![message(Some(file(id, IngestionStatus::Completed)))];

        let mut catalog = MockCatalogProvider::new();
        catalog.expect_get_file().times(0);

        let classified = classify_files(&messages, &catalog, Some(id)).await.unwrap();

        assert_eq!(classified.rag_ids, vec![id]);
        assert!(classified.inline_ids.is_empty());
    }

    #[tokio::test]
    async fn missing_files_are_counted_not_classified() {
        let messages = vec![orphan_message(Uuid::new_v4())];

        let catalog = MockCatalogProvider::new();
        let classified = classify_files(&messages, &catalog, None).await.unwrap();

        assert!(classified.inline_ids.is_empty());
        assert!(classified.rag_ids.is_empty());
        assert_eq!(classified.not_found, 1);
    }
}
