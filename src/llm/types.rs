use std::env;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Connection settings for the chat completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
}

impl ChatSettings {
    /// Reads the `llm` section of the config, falling back to the OpenAI
    /// defaults. The API key may also come from `OPENAI_API_KEY`.
    pub fn from_config(config: &Value) -> Self {
        let section = config.get("llm");

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

        let temperature = section
            .and_then(|s| s.get("temperature"))
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_TEMPERATURE);

        ChatSettings {
            base_url,
            model,
            api_key,
            temperature,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&Value::Null)
    }
}
