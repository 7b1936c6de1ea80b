//! Stowage storage substrate.
//!
//! Three stores and the guard rails around them:
//!
//! - [`Catalog`] - the authoritative SQLite tables (`tenant`,
//!   `catalog_file`, `catalog_json`, `chunk`, `query_log`). Every commit
//!   that moves tenant usage runs in the same transaction as the row it
//!   accounts for, so the `usage ≤ quota` invariant holds at every
//!   successful commit.
//! - [`RelationalStore`] - per-document `payload_<id>` tables sharing the
//!   catalog's database (DDL + rows + indexes in one transaction).
//! - [`DocumentStore`] - redb-backed document collection with
//!   `(tenant, created_at)` and tag secondary indexes.
//!
//! [`TenantGuard`] is the single door to quota: admission reserves
//! headroom in memory, commits re-check inside the catalog transaction,
//! and [`AdmitToken`] releases its reservation on every exit path.
//! [`Reconciler`] sweeps the cross-store seams the transactions cannot
//! cover. [`OpCtx`] carries cancellation and deadlines through the write
//! paths.

mod catalog;
mod document;
mod error;
pub mod op;
mod reconcile;
mod relational;
mod tenant;

pub use crate::catalog::{
    blob_to_vector, vector_to_blob, Catalog, ChunkRecord, FileRecord, JsonRecord, QueryLogRecord,
    TenantRecord, ThumbDescriptor,
};
pub use crate::document::{DocumentEnvelope, DocumentStore};
pub use crate::error::StoreError;
pub use crate::op::{CancelToken, Interrupted, OpCtx};
pub use crate::reconcile::{ReconcileReport, Reconciler};
pub use crate::relational::{validate_doc_id, RelationalStore};
pub use crate::tenant::{AdmitToken, TenantGuard, TenantScope};
