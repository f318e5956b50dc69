use crate::error::BackendError;
use crate::store::{check_response, SupabaseConfig};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::json;

const BACKEND: &str = "supabase-storage";

#[derive(Clone)]
pub struct SupabaseStorage {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn object_url(&self, key: &str) -> String {
        self.config.endpoint(&format!(
            "storage/v1/object/{}/{}",
            self.config.bucket,
            key.trim_start_matches('/')
        ))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    async fn send_bytes(
        &self,
        method: Method,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<(), BackendError> {
        let response = self
            .request(method, self.object_url(key))
            .header("content-type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes.to_vec())
            .send()
            .await?;
        check_response(BACKEND, response).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.send_bytes(Method::POST, key, bytes, content_type, false)
            .await
    }

    async fn overwrite(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.send_bytes(Method::PUT, key, bytes, content_type, true)
            .await
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let url = self
            .config
            .endpoint(&format!("storage/v1/object/{}", self.config.bucket));
        let response = self
            .request(Method::DELETE, url)
            .json(&json!({ "prefixes": [key] }))
            .send()
            .await?;
        check_response(BACKEND, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_is_scoped_to_bucket() {
        let config =
            SupabaseConfig::new("https://p.supabase.co", "anon", "service", "files").unwrap();
        let storage = SupabaseStorage::new(config);
        assert_eq!(
            storage.object_url("files/abc.pdf"),
            "https://p.supabase.co/storage/v1/object/files/files/abc.pdf"
        );
    }
}
