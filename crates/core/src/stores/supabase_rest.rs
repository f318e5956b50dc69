use crate::error::BackendError;
use crate::models::{Document, NewChunk, NewDocument, StoredChunk};
use crate::store::{check_response, SupabaseConfig};
use crate::traits::DocumentRepository;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::warn;

const BACKEND: &str = "postgrest";
const FILE_COLUMNS: &str = "id,filename,storage_path,created_at";

/// `files` and `chunks` tables through PostgREST, authenticated with the service role key.
#[derive(Clone)]
pub struct SupabaseRestStore {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseRestStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn table(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, self.config.endpoint(&format!("rest/v1/{table}")))
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    async fn select_files(&self, filters: &[(&str, String)]) -> Result<Vec<Document>, BackendError> {
        let mut query = vec![("select", FILE_COLUMNS.to_string())];
        query.extend(filters.iter().map(|(key, value)| (*key, value.clone())));

        let response = self
            .table(reqwest::Method::GET, "files")
            .query(&query)
            .send()
            .await?;
        let response = check_response(BACKEND, response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DocumentRepository for SupabaseRestStore {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<Document>, BackendError> {
        let rows = self
            .select_files(&[("filename", format!("eq.{filename}")), ("limit", "1".into())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, BackendError> {
        let rows = self
            .select_files(&[("id", format!("eq.{id}")), ("limit", "1".into())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, BackendError> {
        self.select_files(&[("order", "created_at.desc".into())]).await
    }

    async fn insert_document(&self, document: &NewDocument) -> Result<Document, BackendError> {
        let response = self
            .table(reqwest::Method::POST, "files")
            .header("Prefer", "return=representation")
            .query(&[("select", FILE_COLUMNS)])
            .json(document)
            .send()
            .await?;
        let response = check_response(BACKEND, response).await?;
        let rows: Vec<Document> = response.json().await?;

        rows.into_iter().next().ok_or_else(|| BackendError::BackendResponse {
            backend: BACKEND.to_string(),
            status: 200,
            details: "insert returned no rows".to_string(),
        })
    }

    async fn delete_document(&self, id: &str) -> Result<(), BackendError> {
        let response = self
            .table(reqwest::Method::DELETE, "files")
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        check_response(BACKEND, response).await?;
        Ok(())
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<(), BackendError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let response = self
            .table(reqwest::Method::POST, "chunks")
            .header("Prefer", "return=minimal")
            .json(chunks)
            .send()
            .await?;
        check_response(BACKEND, response).await?;
        Ok(())
    }

    async fn load_corpus(&self) -> Result<Vec<StoredChunk>, BackendError> {
        let response = self
            .table(reqwest::Method::GET, "chunks")
            .query(&[("select", "id,file_id,content,embedding,files!inner(filename)")])
            .send()
            .await?;
        let response = check_response(BACKEND, response).await?;
        let rows: Vec<Value> = response.json().await?;

        Ok(rows.iter().filter_map(parse_chunk_row).collect())
    }

    async fn filename_for(&self, file_id: &str) -> Result<Option<String>, BackendError> {
        let rows = self
            .select_files(&[("id", format!("eq.{file_id}")), ("limit", "1".into())])
            .await?;
        Ok(rows.into_iter().next().map(|document| document.filename))
    }
}

fn parse_chunk_row(row: &Value) -> Option<StoredChunk> {
    let id = row.pointer("/id").and_then(Value::as_str)?.to_string();
    let file_id = row.pointer("/file_id").and_then(Value::as_str)?.to_string();
    let content = row
        .pointer("/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let embedding = match row.pointer("/embedding").and_then(parse_embedding) {
        Some(embedding) => embedding,
        None => {
            warn!(chunk_id = %id, "skipping chunk with unreadable embedding");
            return None;
        }
    };

    let filename = match row.pointer("/files") {
        Some(Value::Array(items)) => items.first().and_then(|item| item.pointer("/filename")),
        Some(item) if item.is_object() => item.pointer("/filename"),
        _ => None,
    }
    .and_then(Value::as_str)
    .map(str::to_string);

    Some(StoredChunk {
        id,
        file_id,
        content,
        embedding,
        filename,
    })
}

/// pgvector columns come back as `"[0.1,0.2]"` strings; plain arrays are accepted too.
fn parse_embedding(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::String(literal) => serde_json::from_str(literal).ok(),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_f64().map(|number| number as f32))
            .collect(),
        _ => None,
    }
}
