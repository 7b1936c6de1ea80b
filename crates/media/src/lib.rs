//! Stowage media pipeline.
//!
//! This is where binary artifacts enter the system. One call to
//! [`MediaPipeline::ingest`] takes a byte stream and leaves behind either
//! a fully committed artifact - canonical file, derivatives, catalog row,
//! charged quota - or nothing at all.
//!
//! The pipeline is a strict state machine per ingest:
//!
//! ```text
//! RECEIVING -> STAGED -> CLASSIFIED -> COMMITTED | ABORTED
//! ```
//!
//! - **RECEIVING**: the stream is copied into a tenant-scoped staging
//!   file while SHA-256, byte length, and the magic-sniff head are
//!   computed incrementally. Quota is enforced *while streaming*: the
//!   moment cumulative tenant usage plus observed bytes would cross the
//!   quota, the ingest aborts - no post-hoc check on a fully buffered
//!   upload.
//! - **STAGED -> CLASSIFIED**: the taxonomy maps
//!   `(extension, declared MIME, magic MIME)` to a category, and the
//!   canonical path is synthesized and claimed via atomic rename, with
//!   bounded re-synthesis on collision.
//! - **COMMITTED**: derivatives and metadata are produced (failures here
//!   degrade to warnings, never failed ingests), then the catalog row and
//!   the tenant usage update commit in one transaction.
//!
//! Every exit path releases the staging file and the admit token; a
//! failure after canonical placement also removes the canonical file and
//! any partial derivatives. Only `COMMITTED` is observable.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use store::{Catalog, FileRecord, OpCtx, TenantGuard};
use taxonomy::{synthesize_path, TaxonomyConfig};

mod error;
mod metadata;
mod staging;
mod thumbs;

pub use crate::error::MediaError;
pub use crate::staging::StagedUpload;
pub use crate::thumbs::{derivative_paths, THUMB_SIZES};

const STREAM_BUF_BYTES: usize = 64 * 1024;
const MAGIC_SNIFF_BYTES: usize = 8192;
const PLACEMENT_ATTEMPTS: u32 = 3;

/// Removes the canonical file and derivatives unless the commit landed.
struct PlacedArtifact<'a> {
    root: &'a Path,
    rel_path: String,
    committed: bool,
}

impl Drop for PlacedArtifact<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(self.root.join(&self.rel_path));
            thumbs::remove(self.root, &self.rel_path);
        }
    }
}

/// The media ingest pipeline (classification, placement, derivatives,
/// catalog commit).
pub struct MediaPipeline {
    root: PathBuf,
    taxonomy: Arc<TaxonomyConfig>,
    catalog: Catalog,
    guard: Arc<TenantGuard>,
}

impl MediaPipeline {
    pub fn new(
        root: PathBuf,
        taxonomy: Arc<TaxonomyConfig>,
        catalog: Catalog,
        guard: Arc<TenantGuard>,
    ) -> Result<Self, MediaError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            taxonomy,
            catalog,
            guard,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a committed artifact.
    pub fn absolute_path(&self, record: &FileRecord) -> PathBuf {
        self.root.join(&record.path)
    }

    /// Read a committed artifact's bytes back.
    pub fn read_bytes(&self, record: &FileRecord) -> Result<Vec<u8>, MediaError> {
        Ok(std::fs::read(self.absolute_path(record))?)
    }

    /// Remove the canonical file and all derivatives of a record; missing
    /// files are tolerated (delete is idempotent).
    pub fn remove_artifacts(&self, record: &FileRecord) {
        let _ = std::fs::remove_file(self.absolute_path(record));
        thumbs::remove(&self.root, &record.path);
    }

    /// Ingest one stream. See the crate docs for the state machine.
    pub fn ingest(
        &self,
        tenant_id: &str,
        reader: &mut dyn Read,
        declared_name: &str,
        declared_mime: Option<&str>,
        comment: Option<&str>,
        ctx: &OpCtx,
    ) -> Result<FileRecord, MediaError> {
        let start = Instant::now();
        let span = info_span!("media.ingest", tenant_id = %tenant_id, declared_name = %declared_name);
        let _guard = span.enter();

        match self.ingest_inner(tenant_id, reader, declared_name, declared_mime, comment, ctx) {
            Ok(record) => {
                info!(
                    file_id = %record.id,
                    category = %record.category,
                    size_bytes = record.size_bytes,
                    elapsed_micros = start.elapsed().as_micros() as u64,
                    "media_ingest_success"
                );
                Ok(record)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    elapsed_micros = start.elapsed().as_micros() as u64,
                    "media_ingest_failure"
                );
                Err(err)
            }
        }
    }

    fn ingest_inner(
        &self,
        tenant_id: &str,
        reader: &mut dyn Read,
        declared_name: &str,
        declared_mime: Option<&str>,
        comment: Option<&str>,
        ctx: &OpCtx,
    ) -> Result<FileRecord, MediaError> {
        if declared_name.trim().is_empty() {
            return Err(MediaError::Validation("declared filename is empty".into()));
        }

        let mut token = self.guard.admit(tenant_id, 0)?;
        let mut staged = StagedUpload::create(&self.root, tenant_id)?;
        debug!(state = "RECEIVING", staging = %staged.path().display());

        let mut hasher = Sha256::new();
        let mut head: Vec<u8> = Vec::with_capacity(MAGIC_SNIFF_BYTES);
        let mut size_bytes: u64 = 0;
        let mut buf = vec![0u8; STREAM_BUF_BYTES];
        loop {
            ctx.check()?;
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            // Claim quota before the bytes hit disk; a refusal here is the
            // mid-stream abort.
            self.guard.reserve(&mut token, n as u64)?;
            hasher.update(&buf[..n]);
            if head.len() < MAGIC_SNIFF_BYTES {
                let want = MAGIC_SNIFF_BYTES - head.len();
                head.extend_from_slice(&buf[..n.min(want)]);
            }
            staged.write_all(&buf[..n])?;
            size_bytes += n as u64;
        }
        let sha256 = hex::encode(hasher.finalize());
        debug!(state = "STAGED", size_bytes, sha256 = %sha256);

        let magic = infer::get(&head).map(|t| t.mime_type());
        let hit = self
            .taxonomy
            .classify(declared_name, declared_mime, magic);
        debug!(state = "CLASSIFIED", category = %hit.category, matched_by = %hit.matched_by);

        let mut rel_path: Option<String> = None;
        for _attempt in 0..PLACEMENT_ATTEMPTS {
            ctx.check()?;
            let candidate =
                synthesize_path(&hit.category, tenant_id, declared_name, Utc::now());
            let target = self.root.join(&candidate);
            if target.exists() {
                continue;
            }
            staged.promote(&target)?;
            rel_path = Some(candidate);
            break;
        }
        let rel_path = rel_path.ok_or(MediaError::NameCollision(PLACEMENT_ATTEMPTS))?;
        let mut placed = PlacedArtifact {
            root: &self.root,
            rel_path: rel_path.clone(),
            committed: false,
        };

        // Derivative and metadata work is best-effort from here on: the
        // ingest already owns its canonical bytes.
        let thumbable = self.taxonomy.is_thumbable(&hit.category);
        let thumbs = if thumbable && size_bytes > 0 {
            match thumbs::generate(&self.root, &rel_path) {
                Ok(thumbs) => thumbs,
                Err(err) => {
                    warn!(error = %err, "thumbnail_generation_failed");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let meta = metadata::extract(&self.root.join(&rel_path), thumbable && size_bytes > 0);

        let record = FileRecord {
            id: format!("file_{}", Uuid::new_v4().simple()),
            tenant: tenant_id.to_string(),
            original_name: declared_name.to_string(),
            category: hit.category,
            mime: hit.effective_mime,
            size_bytes,
            sha256,
            path: rel_path,
            created_at: Utc::now(),
            indexed: false,
            indexed_sha: None,
            thumbs,
            comment: comment.map(str::to_string),
            orphaned: false,
            meta,
        };

        // Commit is the non-cancellable point: catalog row plus usage in
        // one transaction, quota re-checked inside.
        self.catalog.commit_file(&record)?;
        placed.committed = true;
        self.guard.commit(token);
        debug!(state = "COMMITTED", file_id = %record.id);
        Ok(record)
    }
}
