//! Error types produced by the `search` crate.
use thiserror::Error;

use embedding::EmbeddingError;
use store::StoreError;

/// Errors surfaced by the vector index, prefix index, and composer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SearchError {
    #[error("query dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("invalid search request: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}
