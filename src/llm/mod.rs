//! Chat completion client.
//!
//! OpenAI-compatible `/v1/chat/completions` access with blocking and
//! SSE-streaming variants, used by the chat endpoint to generate the
//! grounded reply.

mod openai;
mod types;

pub use openai::OpenAiChatClient;
pub use types::{ChatMessage, ChatSettings};

#[cfg(test)]
mod tests;
