//! Error types produced by the `embedding` crate.
use thiserror::Error;

/// Errors surfaced by an embedding gateway.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum EmbeddingError {
    /// Misconfiguration caught at construction/startup.
    #[error("invalid embedding configuration: {0}")]
    InvalidConfig(String),
    /// Bounded retries exhausted or the service refused the request.
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with something other than the agreed shape.
    #[error("malformed embedding response: {0}")]
    Response(String),
    /// A vector of the wrong dimension is an invariant violation at the
    /// call site, never silently padded or truncated.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
