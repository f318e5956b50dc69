//! In-process backends. They honour the same contracts as the Supabase adapters
//! (unique filenames, cascading chunk deletes, conflicts on existing keys), which
//! makes them suitable for local runs and tests.

use crate::error::BackendError;
use crate::models::{
    AuthenticatedUser, Document, LoginSession, NewChunk, NewDocument, StoredChunk,
};
use crate::traits::{DocumentRepository, IdentityProvider, ObjectStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct RepositoryState {
    documents: Vec<Document>,
    chunks: Vec<StoredChunk>,
    batch_sizes: Vec<usize>,
    conflict_next_insert: bool,
    fail_chunk_inserts: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<RwLock<RepositoryState>>,
}

impl InMemoryRepository {
    pub async fn chunks_for(&self, file_id: &str) -> Vec<StoredChunk> {
        self.state
            .read()
            .await
            .chunks
            .iter()
            .filter(|chunk| chunk.file_id == file_id)
            .cloned()
            .collect()
    }

    pub async fn chunk_batch_sizes(&self) -> Vec<usize> {
        self.state.read().await.batch_sizes.clone()
    }

    /// Simulates losing a check-then-insert race on the filename constraint.
    pub async fn reject_next_insert_as_conflict(&self) {
        self.state.write().await.conflict_next_insert = true;
    }

    pub async fn fail_chunk_inserts(&self) {
        self.state.write().await.fail_chunk_inserts = true;
    }

    /// Drops the joined filename from every stored chunk.
    pub async fn forget_joined_filenames(&self) {
        for chunk in self.state.write().await.chunks.iter_mut() {
            chunk.filename = None;
        }
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<Document>, BackendError> {
        Ok(self
            .state
            .read()
            .await
            .documents
            .iter()
            .find(|document| document.filename == filename)
            .cloned())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, BackendError> {
        Ok(self
            .state
            .read()
            .await
            .documents
            .iter()
            .find(|document| document.id == id)
            .cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, BackendError> {
        let mut documents = self.state.read().await.documents.clone();
        documents.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(documents)
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<Document, BackendError> {
        let mut state = self.state.write().await;
        let taken = state
            .documents
            .iter()
            .any(|existing| existing.filename == document.filename);
        if std::mem::take(&mut state.conflict_next_insert) || taken {
            return Err(BackendError::Conflict {
                backend: "memory".to_string(),
                details: format!("filename {} already exists", document.filename),
            });
        }

        let created = Document {
            id: Uuid::new_v4().to_string(),
            filename: document.filename.clone(),
            storage_path: Some(document.storage_path.clone()),
            created_at: Utc::now(),
        };
        state.documents.push(created.clone());
        Ok(created)
    }

    async fn delete_document(&self, id: &str) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        state.documents.retain(|document| document.id != id);
        state.chunks.retain(|chunk| chunk.file_id != id);
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        if state.fail_chunk_inserts {
            return Err(BackendError::Request("chunk insert rejected".to_string()));
        }

        let filenames: HashMap<String, String> = state
            .documents
            .iter()
            .map(|document| (document.id.clone(), document.filename.clone()))
            .collect();
        for chunk in chunks {
            let filename = filenames.get(&chunk.file_id).cloned().ok_or_else(|| {
                BackendError::Request(format!("unknown file_id {}", chunk.file_id))
            })?;
            state.chunks.push(StoredChunk {
                id: Uuid::new_v4().to_string(),
                file_id: chunk.file_id.clone(),
                content: chunk.content.clone(),
                embedding: chunk.embedding.clone(),
                filename: Some(filename),
            });
        }
        state.batch_sizes.push(chunks.len());
        Ok(())
    }

    async fn load_corpus(&self) -> Result<Vec<StoredChunk>, BackendError> {
        Ok(self.state.read().await.chunks.clone())
    }

    async fn filename_for(&self, file_id: &str) -> Result<Option<String>, BackendError> {
        Ok(self
            .get_document(file_id)
            .await?
            .map(|document| document.filename))
    }
}

#[derive(Debug, Default)]
struct ObjectState {
    objects: BTreeMap<String, Vec<u8>>,
    conflict_next_upload: bool,
    fail_removals: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    state: Arc<RwLock<ObjectState>>,
}

impl InMemoryObjectStore {
    pub async fn keys(&self) -> Vec<String> {
        self.state.read().await.objects.keys().cloned().collect()
    }

    pub async fn reject_next_upload_as_conflict(&self) {
        self.state.write().await.conflict_next_upload = true;
    }

    pub async fn fail_removals(&self) {
        self.state.write().await.fail_removals = true;
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        if std::mem::take(&mut state.conflict_next_upload) || state.objects.contains_key(key) {
            return Err(BackendError::Conflict {
                backend: "memory".to_string(),
                details: format!("object {key} already exists"),
            });
        }
        state.objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn overwrite(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), BackendError> {
        self.state
            .write()
            .await
            .objects
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut state = self.state.write().await;
        if state.fail_removals {
            return Err(BackendError::Request(format!("could not remove {key}")));
        }
        state.objects.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: AuthenticatedUser,
}

/// Accepts accounts registered up front; the issued token is the user id prefixed with `token-`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryIdentityProvider {
    pub async fn register(&self, email: &str, password: &str, role: &str) -> AuthenticatedUser {
        let user = AuthenticatedUser {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        };
        self.accounts.write().await.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<LoginSession>, BackendError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(email)
            .filter(|account| account.password == password)
            .map(|account| LoginSession {
                access_token: format!("token-{}", account.user.id),
                user: account.user.clone(),
            }))
    }

    async fn verify(&self, access_token: &str) -> Result<Option<AuthenticatedUser>, BackendError> {
        let Some(user_id) = access_token.strip_prefix("token-") else {
            return Ok(None);
        };
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.user.id == user_id)
            .map(|account| account.user.clone()))
    }
}
