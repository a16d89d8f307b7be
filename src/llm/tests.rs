use serde_json::json;

use super::openai::extract_delta;
use super::types::{ChatMessage, ChatSettings};

#[test]
fn extract_delta_reads_stream_chunks() {
    let payload = json!({
        "choices": [{"delta": {"content": "Hel"}}]
    });
    assert_eq!(extract_delta(&payload).as_deref(), Some("Hel"));
}

#[test]
fn extract_delta_reads_full_messages() {
    let payload = json!({
        "choices": [{"message": {"role": "assistant", "content": "A mug, perhaps."}}]
    });
    assert_eq!(extract_delta(&payload).as_deref(), Some("A mug, perhaps."));
}

#[test]
fn extract_delta_reads_legacy_text_field() {
    let payload = json!({
        "choices": [{"text": "plain completion"}]
    });
    assert_eq!(extract_delta(&payload).as_deref(), Some("plain completion"));
}

#[test]
fn extract_delta_handles_missing_choices() {
    assert_eq!(extract_delta(&json!({})), None);
    assert_eq!(extract_delta(&json!({"choices": []})), None);
}

#[test]
fn chat_message_constructor() {
    let message = ChatMessage::new("user", "any gift ideas?");
    assert_eq!(message.role, "user");
    assert_eq!(message.content, "any gift ideas?");
}

#[test]
fn chat_settings_from_config_section() {
    let config = json!({
        "llm": {
            "base_url": "http://127.0.0.1:8088/",
            "model": "local-chat",
            "temperature": 0.2
        }
    });

    let settings = ChatSettings::from_config(&config);
    assert_eq!(settings.base_url, "http://127.0.0.1:8088");
    assert_eq!(settings.model, "local-chat");
    assert!((settings.temperature - 0.2).abs() < f64::EPSILON);
}
