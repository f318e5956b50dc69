use crate::error::BackendError;
use crate::models::{
    AuthenticatedUser, CompletionRequest, Document, LoginSession, NewChunk, NewDocument,
    StoredChunk,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Relational side: the `files` table and the `chunks` vector table.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<Document>, BackendError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, BackendError>;

    async fn list_documents(&self) -> Result<Vec<Document>, BackendError>;

    /// Must report a filename uniqueness violation as `BackendError::Conflict`.
    async fn insert_document(&self, document: &NewDocument) -> Result<Document, BackendError>;

    /// Deleting a document cascades to its chunks.
    async fn delete_document(&self, id: &str) -> Result<(), BackendError>;

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<(), BackendError>;

    async fn load_corpus(&self) -> Result<Vec<StoredChunk>, BackendError>;

    async fn filename_for(&self, file_id: &str) -> Result<Option<String>, BackendError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Must report an existing key as `BackendError::Conflict`.
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str)
        -> Result<(), BackendError>;

    async fn overwrite(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError>;

    async fn remove(&self, key: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means the credentials were rejected.
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<LoginSession>, BackendError>;

    /// `Ok(None)` means the token is not valid.
    async fn verify(&self, access_token: &str) -> Result<Option<AuthenticatedUser>, BackendError>;
}

#[async_trait]
impl<T: DocumentRepository + ?Sized> DocumentRepository for Arc<T> {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<Document>, BackendError> {
        (**self).find_by_filename(filename).await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, BackendError> {
        (**self).get_document(id).await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, BackendError> {
        (**self).list_documents().await
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<Document, BackendError> {
        (**self).insert_document(document).await
    }

    async fn delete_document(&self, id: &str) -> Result<(), BackendError> {
        (**self).delete_document(id).await
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<(), BackendError> {
        (**self).insert_chunks(chunks).await
    }

    async fn load_corpus(&self) -> Result<Vec<StoredChunk>, BackendError> {
        (**self).load_corpus().await
    }

    async fn filename_for(&self, file_id: &str) -> Result<Option<String>, BackendError> {
        (**self).filename_for(file_id).await
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        (**self).upload(key, bytes, content_type).await
    }

    async fn overwrite(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        (**self).overwrite(key, bytes, content_type).await
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        (**self).remove(key).await
    }
}

#[async_trait]
impl<T: CompletionModel + ?Sized> CompletionModel for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        (**self).complete(request).await
    }
}

#[async_trait]
impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<LoginSession>, BackendError> {
        (**self).sign_in(email, password).await
    }

    async fn verify(&self, access_token: &str) -> Result<Option<AuthenticatedUser>, BackendError> {
        (**self).verify(access_token).await
    }
}
