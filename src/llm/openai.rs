use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::types::{ChatMessage, ChatSettings};
use crate::core::errors::ApiError;

/// OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct OpenAiChatClient {
    settings: ChatSettings,
    client: Client,
}

impl OpenAiChatClient {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            settings,
            client: Client::new(),
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    fn build_body(&self, messages: &[ChatMessage], stream: bool) -> Result<Value, ApiError> {
        let mut body = Map::new();
        body.insert(
            "model".to_string(),
            Value::String(self.settings.model.clone()),
        );
        body.insert(
            "messages".to_string(),
            serde_json::to_value(messages).map_err(ApiError::internal)?,
        );
        body.insert("stream".to_string(), Value::Bool(stream));
        if let Some(num) = serde_json::Number::from_f64(self.settings.temperature) {
            body.insert("temperature".to_string(), Value::Number(num));
        }
        Ok(Value::Object(body))
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/chat/completions", self.settings.base_url);
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        request
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let body = self.build_body(&messages, false)?;
        let response = self
            .request(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Chat request failed: {} {}",
                status, text
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::internal)?;
        Ok(extract_delta(&payload).unwrap_or_default())
    }

    /// Streams the reply as text deltas over a channel. Transport and
    /// protocol errors arrive on the same channel so the consumer can
    /// surface them mid-stream.
    pub async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let body = self.build_body(&messages, true)?;
        let request = self.request(&body);
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let response = match request.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    let _ = tx.send(Err(ApiError::internal(err))).await;
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let _ = tx
                    .send(Err(ApiError::Internal(format!(
                        "Chat request failed: {} {}",
                        status, text
                    ))))
                    .await;
                return;
            }

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk = String::from_utf8_lossy(&bytes);
                        buffer.push_str(&chunk);

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer = buffer[pos + 1..].to_string();
                            if line.is_empty() {
                                continue;
                            }
                            if let Some(payload) = line.strip_prefix("data:") {
                                let data = payload.trim();
                                if data == "[DONE]" {
                                    return;
                                }
                                if let Ok(json_value) = serde_json::from_str::<Value>(data) {
                                    if let Some(delta) = extract_delta(&json_value) {
                                        if !delta.is_empty() {
                                            let _ = tx.send(Ok(delta)).await;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ApiError::internal(err))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Pulls the text content out of a completion or stream-chunk payload,
/// trying the delta, message and legacy text shapes in turn.
pub(super) fn extract_delta(payload: &Value) -> Option<String> {
    let choice = payload
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first());
    let delta = choice.and_then(|c| c.get("delta"));
    if let Some(content) = delta
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
    {
        return Some(content.to_string());
    }
    if let Some(content) = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
    {
        return Some(content.to_string());
    }
    if let Some(text) = choice.and_then(|c| c.get("text")).and_then(|v| v.as_str()) {
        return Some(text.to_string());
    }
    None
}
