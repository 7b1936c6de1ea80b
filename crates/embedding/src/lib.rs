//! Embedding gateway.
//!
//! The gateway is the only component allowed to talk to the external
//! embedding model; everything else takes an [`EmbeddingGateway`] trait
//! object as a dependency. Two implementations ship here:
//!
//! - [`HttpEmbeddingGateway`] - blocking HTTP adapter with bounded
//!   exponential-backoff retries. Transient faults are absorbed silently
//!   up to the retry budget, then surface as
//!   [`EmbeddingError::Unavailable`].
//! - [`StubGateway`] - deterministic offline embedder for tests and
//!   degraded deployments; same text, same vector, every time.
//!
//! The vector dimension `D` is a system-wide constant carried by
//! [`EmbeddingConfig::dimension`]. Both implementations validate every
//! produced vector against it; a mismatch is a hard error, never a
//! silently padded vector.

mod api;
mod config;
mod error;
mod normalize;
mod retry;
mod stub;

pub use crate::api::HttpEmbeddingGateway;
pub use crate::config::EmbeddingConfig;
pub use crate::error::EmbeddingError;
pub use crate::normalize::{l2_normalize, l2_normalize_in_place};
pub use crate::retry::{execute_with_retry, is_retryable_error, RetryConfig, RetryResult};
pub use crate::stub::StubGateway;

/// Capability set of the embedding service: single-call embed, batched
/// embed, and a liveness probe. `dimension` exposes `D` so call sites can
/// validate vectors without an extra round-trip.
pub trait EmbeddingGateway: Send + Sync {
    /// The fixed vector dimension `D`.
    fn dimension(&self) -> usize;

    /// Embed one text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch. Fails atomically: either every text gets a vector or
    /// the whole call errors.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Liveness probe; also validates the dimension contract where the
    /// implementation can do so cheaply.
    fn health(&self) -> Result<(), EmbeddingError>;
}

/// Check one vector against the configured dimension.
pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(())
}
