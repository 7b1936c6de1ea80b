//! Service-level error taxonomy.
//!
//! Every crate's errors converge here. The variants map one-to-one onto
//! the externally visible error kinds; [`ServiceError::shape`] renders
//! the `{kind, message, hint?}` form the transport layer serializes.

use serde::Serialize;
use thiserror::Error;

use embedding::EmbeddingError;
use media::MediaError;
use search::SearchError;
use store::{Interrupted, StoreError};
use taxonomy::TaxonomyError;

/// Externally visible error kinds.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Forbidden,
    QuotaExceeded,
    NameCollision,
    StoreUnavailable,
    EmbeddingUnavailable,
    Timeout,
    Cancelled,
    NotFound,
    Internal,
}

/// The wire shape of an error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorShape {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Errors surfaced by [`crate::Service`] operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("quota exceeded for tenant {tenant}: usage {usage} + {requested} exceeds quota {quota}")]
    QuotaExceeded {
        tenant: String,
        usage: u64,
        requested: u64,
        quota: u64,
    },
    #[error("canonical path collision persisted")]
    NameCollision,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("operation deadline exceeded")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::NameCollision => ErrorKind::NameCollision,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::QuotaExceeded { .. } => Some("free space for the tenant and retry"),
            Self::EmbeddingUnavailable(_) => Some("the embedding service is down; retry later"),
            Self::Timeout | Self::Cancelled => Some("the operation was rolled back; safe to retry"),
            _ => None,
        }
    }

    pub fn shape(&self) -> ErrorShape {
        ErrorShape {
            kind: self.kind(),
            message: self.to_string(),
            hint: self.hint().map(str::to_string),
        }
    }
}

impl From<Interrupted> for ServiceError {
    fn from(i: Interrupted) -> Self {
        match i {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::Timeout => Self::Timeout,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::UnknownTenant(t) => Self::Forbidden(format!("unknown tenant {t}")),
            StoreError::Inactive(t) => Self::Forbidden(format!("tenant {t} is not active")),
            StoreError::QuotaExceeded {
                tenant,
                usage,
                requested,
                quota,
            } => Self::QuotaExceeded {
                tenant,
                usage,
                requested,
                quota,
            },
            StoreError::InvalidDocId(id) => Self::Validation(format!("invalid document id {id:?}")),
            StoreError::Corrupt(msg) => Self::Internal(msg),
            StoreError::Interrupted(i) => i.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MediaError> for ServiceError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Validation(msg) => Self::Validation(msg),
            MediaError::Io(err) => Self::StoreUnavailable(err.to_string()),
            MediaError::NameCollision(_) => Self::NameCollision,
            MediaError::Image(msg) => Self::Internal(msg),
            MediaError::Store(err) => err.into(),
            MediaError::Interrupted(i) => i.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for ServiceError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::Unavailable(msg) | EmbeddingError::Response(msg) => {
                Self::EmbeddingUnavailable(msg)
            }
            EmbeddingError::DimensionMismatch { expected, got } => Self::Internal(format!(
                "embedding dimension mismatch: expected {expected}, got {got}"
            )),
            EmbeddingError::InvalidConfig(msg) => Self::Internal(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SearchError> for ServiceError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Validation(msg) => Self::Validation(msg),
            SearchError::DimensionMismatch { expected, got } => Self::Internal(format!(
                "query dimension mismatch: expected {expected}, got {got}"
            )),
            SearchError::Store(err) => err.into(),
            SearchError::Embedding(err) => err.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TaxonomyError> for ServiceError {
    fn from(e: TaxonomyError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<chunker::ChunkerError> for ServiceError {
    fn from(e: chunker::ChunkerError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(format!("malformed json: {e}"))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}
