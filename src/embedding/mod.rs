//! Embedding generation.
//!
//! This module provides:
//! - `EmbeddingService`: abstract trait for mapping text to a vector
//! - `OpenAiEmbeddingClient`: OpenAI-compatible `/v1/embeddings` client

mod openai;

pub use openai::{EmbeddingSettings, OpenAiEmbeddingClient};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("embedding request failed: {status} {body}")]
    Status { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// Maps arbitrary text to a fixed-dimension vector.
///
/// Callers treat this as a hard dependency: a failure here carries no
/// partial result.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
