//! Typed failure categories raised at the core's seams.
//!
//! Most functions return [`anyhow::Result`]; these variants are attached
//! where a caller may want to tell an unavailable dependency apart from bad
//! input.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RecallError {
    /// The embedding backend failed or could not be reached.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// The backend answered with the wrong number of vectors.
    #[error("embedding backend returned {got} vectors for {expected} inputs")]
    EmbeddingCountMismatch { expected: usize, got: usize },
    /// A cross-encoder or other model could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    /// A collection name outside the closed set.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    /// A message author role outside `human` / `assistant`.
    #[error("invalid sender '{0}': expected 'human' or 'assistant'")]
    InvalidSender(String),
}
