use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{EmbeddingError, EmbeddingService};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Connection settings for the embedding endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl EmbeddingSettings {
    /// Reads the `embedding` section of the config, falling back to the
    /// OpenAI defaults. The API key may also come from `OPENAI_API_KEY`.
    pub fn from_config(config: &Value) -> Self {
        let section = config.get("embedding");

        let base_url = section
            .and_then(|s| s.get("base_url"))
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let model = section
            .and_then(|s| s.get("model"))
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        let api_key = section
            .and_then(|s| s.get("api_key"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| env::var("OPENAI_API_KEY").ok());

        EmbeddingSettings {
            base_url,
            model,
            api_key,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self::from_config(&Value::Null)
    }
}

/// OpenAI-compatible embedding client.
///
/// Works against any server exposing the `/v1/embeddings` shape, including
/// a local llama-server started with `--embedding`.
#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    settings: EmbeddingSettings,
    client: Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(settings: EmbeddingSettings) -> Self {
        Self {
            settings,
            client: Client::new(),
        }
    }

    pub fn settings(&self) -> &EmbeddingSettings {
        &self.settings
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/v1/embeddings", self.settings.base_url);
        let body = serde_json::json!({
            "model": self.settings.model,
            "input": inputs,
        });

        let mut request = self.client.post(url).json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status { status, body });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Malformed(err.to_string()))?;
        parse_embedding_response(&payload)
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request(&[text]).await?;
        if vectors.is_empty() {
            return Err(EmbeddingError::Malformed(
                "response contained no embedding".to_string(),
            ));
        }
        Ok(vectors.swap_remove(0))
    }
}

/// Parses an OpenAI-style embeddings payload, restoring input order from the
/// per-item `index` field when present.
fn parse_embedding_response(payload: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let Some(data) = payload.get("data").and_then(|v| v.as_array()) else {
        return Err(EmbeddingError::Malformed(
            "response missing data array".to_string(),
        ));
    };

    let mut indexed_embeddings = Vec::with_capacity(data.len());
    for (fallback_idx, item) in data.iter().enumerate() {
        let Some(values) = item.get("embedding").and_then(|v| v.as_array()) else {
            return Err(EmbeddingError::Malformed(
                "response item missing embedding array".to_string(),
            ));
        };

        let mut embedding = Vec::with_capacity(values.len());
        for value in values {
            let Some(float_value) = value.as_f64() else {
                return Err(EmbeddingError::Malformed(
                    "embedding contains non-numeric value".to_string(),
                ));
            };
            embedding.push(float_value as f32);
        }

        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(fallback_idx);
        indexed_embeddings.push((index, embedding));
    }

    indexed_embeddings.sort_by_key(|(idx, _)| *idx);
    Ok(indexed_embeddings
        .into_iter()
        .map(|(_, embedding)| embedding)
        .collect())
}
