//! Error types produced by the `media` crate.
use thiserror::Error;

use store::{Interrupted, StoreError};

/// Errors that can occur during media ingest.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MediaError {
    #[error("invalid media input: {0}")]
    Validation(String),
    #[error("media i/o failure: {0}")]
    Io(#[from] std::io::Error),
    /// Canonical path still occupied after the bounded re-synthesis
    /// attempts; practically unreachable.
    #[error("canonical path collision persisted after {0} attempts")]
    NameCollision(u32),
    /// Thumbnail/metadata decoding problems; demoted to warnings inside
    /// the pipeline, surfaced only from the standalone helpers.
    #[error("image processing failed: {0}")]
    Image(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}
