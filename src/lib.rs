//! Stowage - a multi-tenant intelligent ingestion service core.
//!
//! Stowage accepts two classes of artifacts and places each in the
//! storage engine best suited to its shape:
//!
//! - **Binary files ("media")** run through the classification pipeline:
//!   multi-signal type detection (`extension`, declared MIME, magic
//!   numbers), deterministic category assignment into a closed taxonomy,
//!   canonical path synthesis, thumbnail derivatives, and metadata
//!   extraction - all under streaming quota enforcement.
//! - **Structured JSON documents** run through the shape analyzer and the
//!   routing engine: a single-pass metrics walk scores each tree for a
//!   relational or document backing, then the router persists it with
//!   store-appropriate indexing (per-document SQL tables, or a document
//!   collection with secondary indexes).
//!
//! Indexed text additionally feeds the retrieval core: deterministic
//! chunking, embedding through a gateway to an external model, L2 kNN
//! over a vector index, and a prefix/fuzzy trie for autocomplete.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use stowage::{Service, ServiceConfig};
//! use stowage::embedding::StubGateway;
//! use stowage::store::OpCtx;
//!
//! # fn demo() -> Result<(), stowage::ServiceError> {
//! let config = ServiceConfig::default().with_root_dir("/var/lib/stowage");
//! let gateway = Arc::new(StubGateway::new(config.embedding.dimension, true));
//! let service = Service::open(config, gateway)?;
//!
//! service.create_tenant("tenant-a", 50 * 1024 * 1024)?;
//! let record = service.ingest_media(
//!     "tenant-a",
//!     &mut Cursor::new(b"hello".to_vec()),
//!     "notes.txt",
//!     Some("text/plain"),
//!     None,
//!     &OpCtx::none(),
//! )?;
//! service.index_file("tenant-a", &record.id, &OpCtx::none())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The workspace mirrors the data flow: [`taxonomy`] (classification and
//! canonical paths), [`analyzer`] (shape metrics and the SQL/NoSQL
//! scorer), [`chunker`], [`embedding`] (the only component allowed to
//! talk to the external model), [`store`] (catalog, payload stores,
//! tenant guard, reconciler), [`media`] (the binary pipeline), and
//! [`search`] (vector index, prefix trie, retrieval composer). This
//! crate assembles them into [`Service`] and converges their errors into
//! [`ServiceError`], whose `{kind, message, hint?}` shape is what a
//! transport layer serializes.
//!
//! The core is synchronous and thread-parallel over shared stores; write
//! paths accept an [`store::OpCtx`] carrying cancellation and deadlines,
//! checked at every suspension point. Catalog commits are the
//! non-cancellable points, and a background [`store::Reconciler`] sweeps
//! the seams no transaction can cover.

mod canonical;
mod config;
mod error;
mod service;

pub use crate::canonical::{canonical_json_bytes, doc_id};
pub use crate::config::ServiceConfig;
pub use crate::error::{ErrorKind, ErrorShape, ServiceError};
pub use crate::service::Service;

pub use analyzer;
pub use chunker;
pub use embedding;
pub use media;
pub use search;
pub use store;
pub use taxonomy;
