//! Background reconciler.
//!
//! The catalog is authoritative; the payload stores and the filesystem are
//! reconcilable side effects. A partially failed JSON ingest can leave a
//! payload with no catalog row (dropped here), and a vanished file or
//! payload leaves a catalog row pointing at nothing (flagged `orphaned`,
//! never deleted, to preserve the forensic trace).

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::document::DocumentStore;
use crate::error::StoreError;
use crate::relational::RelationalStore;

/// What one sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Orphan payload tables dropped from the relational store.
    pub dropped_relational: Vec<String>,
    /// Orphan documents removed from the document store.
    pub dropped_documents: Vec<String>,
    /// Catalog JSON rows flagged because their payload is gone.
    pub orphaned_json: Vec<String>,
    /// Catalog file rows flagged because their bytes are gone.
    pub orphaned_files: Vec<String>,
}

/// Sweeps orphans between the catalog, the payload stores, and the
/// filesystem root. Run periodically from a background thread, or directly
/// after a suspicious failure.
pub struct Reconciler {
    catalog: Catalog,
    relational: RelationalStore,
    documents: DocumentStore,
    root: PathBuf,
}

impl Reconciler {
    pub fn new(
        catalog: Catalog,
        relational: RelationalStore,
        documents: DocumentStore,
        root: PathBuf,
    ) -> Self {
        Self {
            catalog,
            relational,
            documents,
            root,
        }
    }

    pub fn sweep(&self) -> Result<ReconcileReport, StoreError> {
        let mut report = ReconcileReport::default();
        let cataloged: HashSet<String> = self
            .catalog
            .all_json_ids()?
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        // Payloads the catalog never heard of: reverse-drop.
        for id in self.relational.list_payload_ids()? {
            if !cataloged.contains(&id) {
                warn!(doc_id = %id, "reconcile_dropping_orphan_payload_table");
                self.relational.drop_payload(&id)?;
                report.dropped_relational.push(id);
            }
        }
        for id in self.documents.list_ids()? {
            if !cataloged.contains(&id) {
                warn!(doc_id = %id, "reconcile_dropping_orphan_document");
                self.documents.delete(&id)?;
                report.dropped_documents.push(id);
            }
        }

        // Catalog rows whose payload went missing: flag, keep the row.
        for (id, backing) in self.catalog.all_json_ids()? {
            let present = match backing.as_str() {
                "relational" => self.relational.payload_exists(&id)?,
                _ => self.documents.contains(&id)?,
            };
            if !present {
                warn!(doc_id = %id, backing = %backing, "reconcile_flagging_orphan_json_row");
                self.catalog.mark_json_orphaned(&id)?;
                report.orphaned_json.push(id);
            }
        }

        // Catalog rows whose file bytes went missing: flag, keep the row.
        for file in self.catalog.all_files()? {
            if file.orphaned {
                continue;
            }
            if !self.root.join(&file.path).is_file() {
                warn!(file_id = %file.id, path = %file.path, "reconcile_flagging_orphan_file_row");
                self.catalog.mark_file_orphaned(&file.id)?;
                report.orphaned_files.push(file.id);
            }
        }

        info!(
            dropped_relational = report.dropped_relational.len(),
            dropped_documents = report.dropped_documents.len(),
            orphaned_json = report.orphaned_json.len(),
            orphaned_files = report.orphaned_files.len(),
            "reconcile_sweep_complete"
        );
        Ok(report)
    }
}
