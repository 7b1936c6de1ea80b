//! Error types produced by the `taxonomy` crate.
use thiserror::Error;

/// Errors raised while loading or validating a taxonomy configuration.
///
/// These are configuration-time issues and should be surfaced at process
/// start-up, before any classification traffic is handled.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TaxonomyError {
    #[error("taxonomy has no `{0}` fallback category")]
    MissingFallback(&'static str),
    #[error("duplicate category tag: {0}")]
    DuplicateCategory(String),
    #[error("category tag {0:?} contains characters outside [a-z0-9_]")]
    InvalidTag(String),
    #[error("failed to read taxonomy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse taxonomy file: {0}")]
    Parse(#[from] toml::de::Error),
}
