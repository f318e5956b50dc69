use crate::embeddings::Embedder;
use crate::error::BackendError;
use crate::models::CompletionRequest;
use crate::store::check_response;
use crate::traits::CompletionModel;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const BACKEND: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimensions: 1536,
            chat_model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Embeddings and chat completions against an OpenAI-compatible endpoint. Single attempt, no retry.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, BackendError> {
        if config.api_key.trim().is_empty() {
            return Err(BackendError::Request("an OpenAI API key is required".to_string()));
        }
        url::Url::parse(&config.base_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, BackendError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        Ok(check_response(BACKEND, response).await?.json().await?)
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| BackendError::BackendResponse {
            backend: BACKEND.to_string(),
            status: 200,
            details: "embedding response had no data".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = self
            .post(
                "embeddings",
                json!({ "model": self.config.embedding_model, "input": texts }),
            )
            .await?;
        parse_embeddings(&payload, texts.len())
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let payload = self
            .post(
                "chat/completions",
                json!({
                    "model": self.config.chat_model,
                    "messages": [
                        {"role": "system", "content": request.system},
                        {"role": "user", "content": request.user},
                    ],
                    "temperature": request.temperature,
                    "max_tokens": request.max_tokens,
                }),
            )
            .await?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::BackendResponse {
                backend: BACKEND.to_string(),
                status: 200,
                details: "completion response had no message content".to_string(),
            })
    }
}

/// Orders vectors by their `index` field so they line up with the request.
fn parse_embeddings(payload: &Value, expected: usize) -> Result<Vec<Vec<f32>>, BackendError> {
    let malformed = |details: String| BackendError::BackendResponse {
        backend: BACKEND.to_string(),
        status: 200,
        details,
    };

    let items = payload
        .pointer("/data")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("embedding response is missing data".to_string()))?;

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, item) in items.iter().enumerate() {
        let index = item
            .pointer("/index")
            .and_then(Value::as_u64)
            .map(|index| index as usize)
            .unwrap_or(position);
        let vector = item
            .pointer("/embedding")
            .and_then(Value::as_array)
            .and_then(|values| {
                values
                    .iter()
                    .map(|value| value.as_f64().map(|number| number as f32))
                    .collect::<Option<Vec<f32>>>()
            })
            .ok_or_else(|| malformed(format!("embedding {index} is not numeric")))?;

        match slots.get_mut(index) {
            Some(slot) => *slot = Some(vector),
            None => return Err(malformed(format!("unexpected embedding index {index}"))),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or_else(|| malformed(format!("missing embedding {index}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_reordered_by_index() {
        let payload = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_embeddings(&payload, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn short_response_is_an_error() {
        let payload = json!({"data": [{"index": 0, "embedding": [1.0]}]});
        assert!(parse_embeddings(&payload, 2).is_err());
        assert!(parse_embeddings(&json!({"error": "quota"}), 1).is_err());
    }

    #[test]
    fn client_requires_api_key() {
        assert!(OpenAiClient::new(OpenAiConfig::default()).is_err());

        let config = OpenAiConfig {
            api_key: "sk-test".to_string(),
            ..OpenAiConfig::default()
        };
        let client = OpenAiClient::new(config).unwrap();
        assert_eq!(client.dimensions(), 1536);
        assert_eq!(
            client.endpoint("embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }
}
