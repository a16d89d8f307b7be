use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

/// Streams a grounded gift-recommendation reply for the conversation.
///
/// The latest user message drives the retrieval: its recommendation context
/// is injected into the system instruction and the ranked gift ids are
/// appended as a machine-readable marker instruction, so the client can
/// extract them from the generated reply.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if payload.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".to_string()));
    }

    let user_text = payload
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| ApiError::BadRequest("no user message found".to_string()))?;

    let built = state.recommender.build(&user_text).await?;
    tracing::debug!(
        ids = built.recommended_gift_ids.len(),
        context_len = built.context.len(),
        "Built recommendation context for chat"
    );

    let system = build_system_prompt(&built.context, &built.recommended_gift_ids);
    let mut messages = vec![ChatMessage::new("system", system)];
    messages.extend(
        payload
            .messages
            .into_iter()
            .map(|m| ChatMessage::new(m.role, m.content)),
    );

    let rx = state.chat.stream_chat(messages).await?;
    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .map(|item| {
        let event = match item {
            Ok(delta) => Event::default().data(delta),
            Err(err) => {
                tracing::error!("Chat stream error: {}", err);
                Event::default().event("error").data(err.to_string())
            }
        };
        Ok(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn build_system_prompt(context: &str, recommended_gift_ids: &[String]) -> String {
    let mut prompt = format!(
        "You are a gift recommendation expert. Use the reference testimonials \
below to suggest the best gift for the user.\n\n\
[Reference Testimonials]\n{}\n\n\
When making suggestions:\n\
- Name concrete gifts\n\
- Explain why each gift fits\n\
- Take budget and the relationship to the recipient into account\n\
- Quote testimonials when available to make the case\n\
- Answer in a natural, conversational tone",
        context
    );

    if !recommended_gift_ids.is_empty() {
        prompt.push_str(&format!(
            "\n\nAt the end of your reply, append the recommended gift ids in \
exactly this format (it is not shown to the user):\n[RECOMMENDED_GIFTS:{}]",
            recommended_gift_ids.join(",")
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_embeds_context_and_marker() {
        let ids = vec!["g1".to_string(), "g2".to_string()];
        let prompt = build_system_prompt("[Testimonial 1: x]", &ids);

        assert!(prompt.contains("[Reference Testimonials]\n[Testimonial 1: x]"));
        assert!(prompt.contains("[RECOMMENDED_GIFTS:g1,g2]"));
    }

    #[test]
    fn system_prompt_omits_marker_without_candidates() {
        let prompt = build_system_prompt("no evidence", &[]);
        assert!(!prompt.contains("RECOMMENDED_GIFTS"));
    }
}
