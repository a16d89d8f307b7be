use thiserror::Error;

use crate::embedding::EmbeddingError;

/// Failure modes of a context build.
///
/// Search-layer failures never appear here: they are logged and degrade to
/// missing evidence, because a partial context is an acceptable outcome and
/// a total failure is not.
#[derive(Debug, Error)]
pub enum RecommendError {
    /// The query was empty after trimming whitespace. Raised before any
    /// external call is made.
    #[error("query text is empty")]
    InvalidQuery,

    /// The embedding service failed. Fatal to the invocation; retry policy,
    /// if any, belongs to the caller.
    #[error("embedding generation failed: {0}")]
    Embedding(#[source] EmbeddingError),
}
