//! Error types produced by the `store` crate.
use thiserror::Error;

use crate::op::Interrupted;

/// Errors surfaced by the catalog, payload stores, and tenant guard.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Relational or document store I/O failure; the unit of work was
    /// rolled back (or is left for the reconciler to compensate).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    #[error("tenant {0} is not active")]
    Inactive(String),
    #[error("quota exceeded for tenant {tenant}: usage {usage} + {requested} exceeds quota {quota}")]
    QuotaExceeded {
        tenant: String,
        usage: u64,
        requested: u64,
        quota: u64,
    },
    /// Document ids double as table-name suffixes, so the alphabet is
    /// restricted to `[A-Za-z0-9_]`.
    #[error("invalid document id {0:?}")]
    InvalidDocId(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl StoreError {
    pub fn unavailable<E: std::fmt::Display>(err: E) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("no such row".into()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}
