use crate::chunking::{split_into_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{BackendError, RagError};
use crate::extractor::{extract_text, DocumentFormat};
use crate::models::{
    DeleteReceipt, Document, IngestionOptions, NewChunk, NewDocument, UploadReceipt,
};
use crate::traits::{DocumentRepository, ObjectStore};
use tracing::{info, warn};
use uuid::Uuid;

/// Undo step registered by a forward step of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    RemoveObject { key: String },
    DeleteDocument { id: String },
}

/// Compensations run newest-first; their own failures are logged and swallowed.
#[derive(Debug, Default)]
pub struct Saga {
    steps: Vec<Compensation>,
}

impl Saga {
    pub fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub fn pending(&self) -> &[Compensation] {
        &self.steps
    }

    pub async fn compensate<R, O>(self, repository: &R, objects: &O)
    where
        R: DocumentRepository,
        O: ObjectStore,
    {
        for step in self.steps.into_iter().rev() {
            let outcome = match &step {
                Compensation::RemoveObject { key } => objects.remove(key).await,
                Compensation::DeleteDocument { id } => repository.delete_document(id).await,
            };
            if let Err(error) = outcome {
                warn!(?step, %error, "compensation failed; continuing");
            }
        }
    }
}

pub struct IngestionService<R, O, E>
where
    R: DocumentRepository,
    O: ObjectStore,
    E: Embedder,
{
    repository: R,
    objects: O,
    embedder: E,
    options: IngestionOptions,
}

impl<R, O, E> IngestionService<R, O, E>
where
    R: DocumentRepository,
    O: ObjectStore,
    E: Embedder,
{
    pub fn new(repository: R, objects: O, embedder: E) -> Self {
        Self::with_options(repository, objects, embedder, IngestionOptions::default())
    }

    pub fn with_options(repository: R, objects: O, embedder: E, options: IngestionOptions) -> Self {
        Self {
            repository,
            objects,
            embedder,
            options,
        }
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, RagError> {
        self.repository
            .list_documents()
            .await
            .map_err(|error| RagError::Persistence(format!("failed to list files: {error}")))
    }

    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadReceipt, RagError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(RagError::Validation("filename is required".to_string()));
        }
        let format = DocumentFormat::from_filename(filename)?;
        if bytes.is_empty() {
            return Err(RagError::Validation(format!("{filename} is empty")));
        }
        let chunking = ChunkingConfig::try_from(&self.options)?;

        let existing = self
            .repository
            .find_by_filename(filename)
            .await
            .map_err(|error| RagError::Persistence(format!("duplicate check failed: {error}")))?;
        if existing.is_some() {
            return Err(RagError::DuplicateFilename(filename.to_string()));
        }

        let mut saga = Saga::default();
        let key = format!("files/{}.{}", Uuid::new_v4(), format.extension());
        self.store_object(&key, bytes, format.content_type()).await?;
        saga.record(Compensation::RemoveObject { key: key.clone() });

        let chunks = match self.extract_and_chunk(bytes, filename, chunking) {
            Ok(chunks) => chunks,
            Err(error) => return Err(self.abort(saga, error).await),
        };

        let document = match self
            .repository
            .insert_document(&NewDocument {
                filename: filename.to_string(),
                storage_path: key.clone(),
            })
            .await
        {
            Ok(document) => document,
            Err(error) if error.is_conflict() => {
                return Err(self
                    .abort(saga, RagError::DuplicateFilename(filename.to_string()))
                    .await)
            }
            Err(error) => {
                let error = RagError::Persistence(format!("failed to save file record: {error}"));
                return Err(self.abort(saga, error).await);
            }
        };
        saga.record(Compensation::DeleteDocument {
            id: document.id.clone(),
        });

        let embeddings = match self.embed_chunks(&chunks).await {
            Ok(embeddings) => embeddings,
            Err(error) => return Err(self.abort(saga, error).await),
        };

        let records: Vec<NewChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(content, embedding)| NewChunk {
                file_id: document.id.clone(),
                content,
                embedding,
            })
            .collect();

        for batch in records.chunks(self.options.insert_batch_size.max(1)) {
            if let Err(error) = self.repository.insert_chunks(batch).await {
                let error = RagError::Persistence(format!("failed to save chunks: {error}"));
                return Err(self.abort(saga, error).await);
            }
        }

        info!(
            file_id = %document.id,
            filename = %document.filename,
            chunk_count = records.len(),
            "file ingested"
        );

        Ok(UploadReceipt {
            id: document.id,
            filename: document.filename,
            status: "success".to_string(),
        })
    }

    pub async fn delete(&self, id: &str) -> Result<DeleteReceipt, RagError> {
        let document = self
            .repository
            .get_document(id)
            .await
            .map_err(|error| RagError::Persistence(format!("failed to look up file: {error}")))?
            .ok_or_else(|| RagError::NotFound(format!("file {id}")))?;

        self.repository
            .delete_document(&document.id)
            .await
            .map_err(|error| RagError::Persistence(format!("failed to delete file: {error}")))?;

        let key = document.object_key();
        if let Err(error) = self.objects.remove(&key).await {
            warn!(file_id = %document.id, key = %key, %error, "stored object was not removed");
        }

        info!(file_id = %document.id, filename = %document.filename, "file deleted");
        Ok(DeleteReceipt {
            status: "deleted".to_string(),
            id: document.id,
        })
    }

    async fn store_object(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), RagError> {
        match self.objects.upload(key, bytes, content_type).await {
            Ok(()) => Ok(()),
            Err(BackendError::Conflict { .. }) => self
                .objects
                .overwrite(key, bytes, content_type)
                .await
                .map_err(|error| RagError::Storage(format!("failed to upload file: {error}"))),
            Err(error) => Err(RagError::Storage(format!("failed to upload file: {error}"))),
        }
    }

    fn extract_and_chunk(
        &self,
        bytes: &[u8],
        filename: &str,
        chunking: ChunkingConfig,
    ) -> Result<Vec<String>, RagError> {
        let text = extract_text(bytes, filename)?;
        if text.is_empty() {
            return Err(RagError::Extraction(format!("no text found in {filename}")));
        }

        let chunks = split_into_chunks(&text, chunking);
        if chunks.is_empty() {
            return Err(RagError::Chunking(format!("{filename} produced no chunks")));
        }
        Ok(chunks)
    }

    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let embeddings = self
            .embedder
            .embed_batch(chunks)
            .await
            .map_err(|error| RagError::Embedding(error.to_string()))?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let width = self.embedder.dimensions();
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != width) {
            return Err(RagError::Embedding(format!(
                "embedding dimension {} != {}",
                bad.len(),
                width
            )));
        }

        Ok(embeddings)
    }

    async fn abort(&self, saga: Saga, error: RagError) -> RagError {
        warn!(%error, steps = saga.pending().len(), "upload failed; rolling back");
        saga.compensate(&self.repository, &self.objects).await;
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::memory::{InMemoryObjectStore, InMemoryRepository};
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn dimensions(&self) -> usize {
            8
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
            Err(BackendError::Request("quota exceeded".to_string()))
        }
    }

    fn service<E: Embedder>(
        embedder: E,
    ) -> (
        IngestionService<InMemoryRepository, InMemoryObjectStore, E>,
        InMemoryRepository,
        InMemoryObjectStore,
    ) {
        let repository = InMemoryRepository::default();
        let objects = InMemoryObjectStore::default();
        let service = IngestionService::new(repository.clone(), objects.clone(), embedder);
        (service, repository, objects)
    }

    fn text_of_len(len: usize) -> Vec<u8> {
        (0..len)
            .map(|index| b'a' + (index % 26) as u8)
            .collect()
    }

    #[tokio::test]
    async fn upload_persists_document_chunks_and_object() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());

        let receipt = service.upload("guide.txt", &text_of_len(1200)).await.unwrap();

        assert_eq!(receipt.filename, "guide.txt");
        assert_eq!(receipt.status, "success");
        let chunks = repository.chunks_for(&receipt.id).await;
        let lengths: Vec<usize> = chunks.iter().map(|chunk| chunk.content.len()).collect();
        assert_eq!(lengths, vec![500, 500, 400]);
        assert!(chunks.iter().all(|chunk| chunk.embedding.len() == 128));

        let document = repository.get_document(&receipt.id).await.unwrap().unwrap();
        let key = document.storage_path.expect("object key recorded");
        assert!(key.starts_with("files/") && key.ends_with(".txt"));
        assert!(!key.contains("guide"));
        assert_eq!(objects.keys().await, vec![key]);
    }

    #[tokio::test]
    async fn unsupported_extension_fails_before_side_effects() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());

        let result = service.upload("deck.pptx", b"slides").await;

        assert!(matches!(result, Err(RagError::UnsupportedFormat(_))));
        assert!(repository.list_documents().await.unwrap().is_empty());
        assert!(objects.keys().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_filename_is_rejected_without_side_effects() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());
        service.upload("guide.txt", b"original body").await.unwrap();
        let objects_before = objects.keys().await;

        let result = service.upload("guide.txt", b"another body").await;

        assert!(matches!(result, Err(RagError::DuplicateFilename(name)) if name == "guide.txt"));
        assert_eq!(repository.list_documents().await.unwrap().len(), 1);
        assert_eq!(objects.keys().await, objects_before);
    }

    #[tokio::test]
    async fn store_conflict_on_insert_maps_to_duplicate_and_cleans_object() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());
        repository.reject_next_insert_as_conflict().await;

        let result = service.upload("race.txt", b"some text").await;

        assert!(matches!(result, Err(RagError::DuplicateFilename(_))));
        assert!(objects.keys().await.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_rolls_back_document_and_object() {
        let (service, repository, objects) = service(FailingEmbedder);

        let result = service.upload("guide.txt", &text_of_len(700)).await;

        assert!(matches!(result, Err(RagError::Embedding(_))));
        assert!(repository.list_documents().await.unwrap().is_empty());
        assert!(repository.load_corpus().await.unwrap().is_empty());
        assert!(objects.keys().await.is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_an_extraction_failure_and_leaves_no_object() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());

        let result = service.upload("blank.txt", b"   \n\t  ").await;

        assert!(matches!(result, Err(RagError::Extraction(_))));
        assert!(repository.list_documents().await.unwrap().is_empty());
        assert!(objects.keys().await.is_empty());
    }

    #[tokio::test]
    async fn object_key_collision_falls_back_to_overwrite() {
        let (service, _repository, objects) = service(CharacterNgramEmbedder::default());
        objects.reject_next_upload_as_conflict().await;

        let receipt = service.upload("guide.txt", b"body text").await;

        assert!(receipt.is_ok());
        assert_eq!(objects.keys().await.len(), 1);
    }

    #[tokio::test]
    async fn chunks_are_inserted_in_bounded_batches() {
        let repository = InMemoryRepository::default();
        let options = IngestionOptions {
            chunk_size: 10,
            chunk_overlap: 0,
            insert_batch_size: 4,
        };
        let service = IngestionService::with_options(
            repository.clone(),
            InMemoryObjectStore::default(),
            CharacterNgramEmbedder::default(),
            options,
        );

        service.upload("long.txt", &text_of_len(95)).await.unwrap();

        assert_eq!(repository.chunk_batch_sizes().await, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn failed_chunk_batch_rolls_back_the_whole_upload() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());
        repository.fail_chunk_inserts().await;

        let result = service.upload("guide.txt", &text_of_len(600)).await;

        assert!(matches!(result, Err(RagError::Persistence(_))));
        assert!(repository.list_documents().await.unwrap().is_empty());
        assert!(objects.keys().await.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_document_chunks_and_object() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());
        let receipt = service.upload("guide.txt", &text_of_len(900)).await.unwrap();

        let deleted = service.delete(&receipt.id).await.unwrap();

        assert_eq!(deleted.status, "deleted");
        assert_eq!(deleted.id, receipt.id);
        assert!(service.list_documents().await.unwrap().is_empty());
        assert!(repository.chunks_for(&receipt.id).await.is_empty());
        assert!(objects.keys().await.is_empty());
    }

    #[tokio::test]
    async fn deleting_unknown_document_is_not_found() {
        let (service, _repository, _objects) = service(CharacterNgramEmbedder::default());
        assert!(matches!(
            service.delete("missing").await,
            Err(RagError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn object_removal_failure_does_not_fail_delete() {
        let (service, repository, objects) = service(CharacterNgramEmbedder::default());
        let receipt = service.upload("guide.txt", b"body text").await.unwrap();
        objects.fail_removals().await;

        let deleted = service.delete(&receipt.id).await;

        assert!(deleted.is_ok());
        assert!(repository.get_document(&receipt.id).await.unwrap().is_none());
    }
}
