use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub filename: String,
    /// Object key of the raw upload. Older rows predate the column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn object_key(&self) -> String {
        self.storage_path
            .clone()
            .unwrap_or_else(|| format!("files/{}", self.filename))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    pub filename: String,
    pub storage_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewChunk {
    pub file_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A chunk loaded for retrieval. `filename` is present when the store joined it in.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub file_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: StoredChunk,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub file_id: String,
    pub filename: String,
    pub chunk_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub id: String,
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteReceipt {
    pub status: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginSession {
    pub access_token: String,
    pub user: AuthenticatedUser,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub insert_batch_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            insert_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub preview_chars: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            temperature: 0.7,
            max_tokens: 1000,
            preview_chars: 200,
        }
    }
}
