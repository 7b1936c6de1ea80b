//! Document payload store on redb.
//!
//! One logical collection: each routed document is stored verbatim inside
//! an envelope carrying the tenant id, creation time, and tag set.
//! Secondary index tables cover `(tenant, created_at DESC)` lookups and
//! tag membership; redb's ACID write transactions keep the envelope and
//! its index entries consistent.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;
use crate::tenant::TenantScope;

const DOCS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
const IDX_TENANT_CREATED: TableDefinition<&str, &str> =
    TableDefinition::new("idx_tenant_created");
const IDX_TAG: TableDefinition<&str, &str> = TableDefinition::new("idx_tag");

/// Unit separator; cannot occur in tenant ids, tags, or document ids.
const SEP: char = '\u{1f}';

/// Stored envelope: the original structure verbatim plus tenancy metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentEnvelope {
    pub id: String,
    pub tenant_id: String,
    pub created_at_millis: i64,
    pub tags: Vec<String>,
    pub doc: Value,
}

fn tenant_created_key(tenant: &str, created_at_millis: i64, id: &str) -> String {
    format!("{tenant}{SEP}{created_at_millis:020}{SEP}{id}")
}

fn tag_key(tag: &str, id: &str) -> String {
    format!("{tag}{SEP}{id}")
}

/// redb-backed document collection.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Database>,
}

impl DocumentStore {
    /// Open or create the store, materializing its tables.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::unavailable)?;
        let txn = db.begin_write().map_err(StoreError::unavailable)?;
        {
            txn.open_table(DOCS).map_err(StoreError::unavailable)?;
            txn.open_table(IDX_TENANT_CREATED)
                .map_err(StoreError::unavailable)?;
            txn.open_table(IDX_TAG).map_err(StoreError::unavailable)?;
        }
        txn.commit().map_err(StoreError::unavailable)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Upsert a document with its index entries in one transaction.
    pub fn put(
        &self,
        id: &str,
        tenant: &str,
        created_at: DateTime<Utc>,
        tags: &[String],
        doc: &Value,
    ) -> Result<(), StoreError> {
        let envelope = DocumentEnvelope {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            created_at_millis: created_at.timestamp_millis(),
            tags: tags.to_vec(),
            doc: doc.clone(),
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let txn = self.db.begin_write().map_err(StoreError::unavailable)?;
        {
            let mut docs = txn.open_table(DOCS).map_err(StoreError::unavailable)?;
            let mut by_tenant = txn
                .open_table(IDX_TENANT_CREATED)
                .map_err(StoreError::unavailable)?;
            let mut by_tag = txn.open_table(IDX_TAG).map_err(StoreError::unavailable)?;

            // Upsert semantics: retire index entries of any prior version.
            let prior = docs
                .insert(id, bytes.as_slice())
                .map_err(StoreError::unavailable)?
                .map(|guard| guard.value().to_vec());
            if let Some(prior) = prior {
                let old: DocumentEnvelope = serde_json::from_slice(&prior)?;
                by_tenant
                    .remove(
                        tenant_created_key(&old.tenant_id, old.created_at_millis, id).as_str(),
                    )
                    .map_err(StoreError::unavailable)?;
                for tag in &old.tags {
                    by_tag
                        .remove(tag_key(tag, id).as_str())
                        .map_err(StoreError::unavailable)?;
                }
            }

            by_tenant
                .insert(
                    tenant_created_key(tenant, envelope.created_at_millis, id).as_str(),
                    id,
                )
                .map_err(StoreError::unavailable)?;
            for tag in tags {
                by_tag
                    .insert(tag_key(tag, id).as_str(), id)
                    .map_err(StoreError::unavailable)?;
            }
        }
        txn.commit().map_err(StoreError::unavailable)?;
        debug!(doc_id = %id, tenant_id = %tenant, "document_payload_written");
        Ok(())
    }

    fn envelope(&self, id: &str) -> Result<Option<DocumentEnvelope>, StoreError> {
        let txn = self.db.begin_read().map_err(StoreError::unavailable)?;
        let docs = txn.open_table(DOCS).map_err(StoreError::unavailable)?;
        let found = docs.get(id).map_err(StoreError::unavailable)?;
        match found {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Fetch the original document under the tenant scope.
    pub fn get(&self, scope: &TenantScope, id: &str) -> Result<Option<Value>, StoreError> {
        match self.envelope(id)? {
            Some(env) if env.tenant_id == scope.tenant_id() => Ok(Some(env.doc)),
            _ => Ok(None),
        }
    }

    /// Remove a document and its index entries; returns whether it
    /// existed.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let txn = self.db.begin_write().map_err(StoreError::unavailable)?;
        let existed;
        {
            let mut docs = txn.open_table(DOCS).map_err(StoreError::unavailable)?;
            let mut by_tenant = txn
                .open_table(IDX_TENANT_CREATED)
                .map_err(StoreError::unavailable)?;
            let mut by_tag = txn.open_table(IDX_TAG).map_err(StoreError::unavailable)?;

            let removed = docs
                .remove(id)
                .map_err(StoreError::unavailable)?
                .map(|guard| guard.value().to_vec());
            existed = removed.is_some();
            if let Some(bytes) = removed {
                let env: DocumentEnvelope = serde_json::from_slice(&bytes)?;
                by_tenant
                    .remove(tenant_created_key(&env.tenant_id, env.created_at_millis, id).as_str())
                    .map_err(StoreError::unavailable)?;
                for tag in &env.tags {
                    by_tag
                        .remove(tag_key(tag, id).as_str())
                        .map_err(StoreError::unavailable)?;
                }
            }
        }
        txn.commit().map_err(StoreError::unavailable)?;
        Ok(existed)
    }

    /// Whether a document exists, tenancy ignored. Reconciler only.
    pub fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.envelope(id)?.is_some())
    }

    /// All stored document ids. Reconciler only.
    pub fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read().map_err(StoreError::unavailable)?;
        let docs = txn.open_table(DOCS).map_err(StoreError::unavailable)?;
        let mut ids = Vec::new();
        for entry in docs.iter().map_err(StoreError::unavailable)? {
            let (key, _) = entry.map_err(StoreError::unavailable)?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    /// Document ids for a tenant, newest first, via the secondary index.
    pub fn ids_for_tenant(&self, scope: &TenantScope) -> Result<Vec<String>, StoreError> {
        let start = format!("{}{SEP}", scope.tenant_id());
        let end = format!("{}{}", scope.tenant_id(), '\u{20}');
        let txn = self.db.begin_read().map_err(StoreError::unavailable)?;
        let by_tenant = txn
            .open_table(IDX_TENANT_CREATED)
            .map_err(StoreError::unavailable)?;
        let mut ids = Vec::new();
        for entry in by_tenant
            .range(start.as_str()..end.as_str())
            .map_err(StoreError::unavailable)?
        {
            let (_, value) = entry.map_err(StoreError::unavailable)?;
            ids.push(value.value().to_string());
        }
        ids.reverse();
        Ok(ids)
    }

    /// Document ids carrying a tag.
    pub fn ids_for_tag(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        let start = format!("{tag}{SEP}");
        let end = format!("{tag}{}", '\u{20}');
        let txn = self.db.begin_read().map_err(StoreError::unavailable)?;
        let by_tag = txn.open_table(IDX_TAG).map_err(StoreError::unavailable)?;
        let mut ids = Vec::new();
        for entry in by_tag
            .range(start.as_str()..end.as_str())
            .map_err(StoreError::unavailable)?
        {
            let (_, value) = entry.map_err(StoreError::unavailable)?;
            ids.push(value.value().to_string());
        }
        Ok(ids)
    }
}
