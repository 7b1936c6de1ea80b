//! Per-document relational payload tables.
//!
//! Every relational-routed JSON document gets its own physical table
//! `payload_<id>` with `(row_id, tenant_id, created_at, body)`, a value
//! index on `body`, and an equality index on `tenant_id`. Array inputs fan
//! out into one row per element; everything else lands as a single row.
//! The tables share the catalog's SQLite database so the DDL, the row
//! inserts, and the indexes commit in one transaction.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::StoreError;
use crate::tenant::TenantScope;

const TABLE_PREFIX: &str = "payload_";
const MAX_DOC_ID_LEN: usize = 96;

/// Validate a document id for use as a table-name suffix.
pub fn validate_doc_id(id: &str) -> Result<(), StoreError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_DOC_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidDocId(id.to_string()))
    }
}

/// Store for relational payload tables.
#[derive(Clone)]
pub struct RelationalStore {
    conn: Arc<Mutex<Connection>>,
}

impl RelationalStore {
    /// Attach to the catalog's database.
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            conn: catalog.shared_connection(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Create `payload_<id>`, its indexes, and the fanned-out rows in one
    /// transaction. Returns the number of rows written (≥ 1).
    pub fn create_payload(
        &self,
        id: &str,
        tenant: &str,
        created_at: DateTime<Utc>,
        tree: &Value,
    ) -> Result<u64, StoreError> {
        validate_doc_id(id)?;
        let table = format!("{TABLE_PREFIX}{id}");
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute_batch(&format!(
            "CREATE TABLE {table} (
                 row_id     INTEGER PRIMARY KEY AUTOINCREMENT,
                 tenant_id  TEXT NOT NULL,
                 created_at INTEGER NOT NULL,
                 body       TEXT NOT NULL
             );
             CREATE INDEX idx_{table}_body ON {table}(body);
             CREATE INDEX idx_{table}_tenant ON {table}(tenant_id);"
        ))?;

        let rows: Vec<&Value> = match tree {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (tenant_id, created_at, body) VALUES (?1, ?2, ?3)"
            ))?;
            for row in &rows {
                stmt.execute(params![
                    tenant,
                    created_at.timestamp_millis(),
                    serde_json::to_string(row)?
                ])?;
            }
        }
        tx.commit()?;
        debug!(doc_id = %id, rows = rows.len(), "relational_payload_created");
        Ok(rows.len() as u64)
    }

    /// Read the payload rows back, in insert order, under the tenant
    /// scope.
    pub fn fetch_payload(&self, scope: &TenantScope, id: &str) -> Result<Vec<Value>, StoreError> {
        validate_doc_id(id)?;
        if !self.payload_exists(id)? {
            return Err(StoreError::NotFound(format!("payload table for {id}")));
        }
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT body FROM {TABLE_PREFIX}{id} WHERE tenant_id = ?1 ORDER BY row_id"
        ))?;
        let rows = stmt.query_map(params![scope.tenant_id()], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for body in rows {
            out.push(serde_json::from_str(&body?)?);
        }
        Ok(out)
    }

    pub fn payload_exists(&self, id: &str) -> Result<bool, StoreError> {
        validate_doc_id(id)?;
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![format!("{TABLE_PREFIX}{id}")],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn row_count(&self, id: &str) -> Result<u64, StoreError> {
        validate_doc_id(id)?;
        let conn = self.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {TABLE_PREFIX}{id}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Drop a payload table; returns whether it existed.
    pub fn drop_payload(&self, id: &str) -> Result<bool, StoreError> {
        validate_doc_id(id)?;
        let existed = self.payload_exists(id)?;
        if existed {
            self.lock()
                .execute_batch(&format!("DROP TABLE IF EXISTS {TABLE_PREFIX}{id}"))?;
        }
        Ok(existed)
    }

    /// Document ids of every payload table. Reconciler only.
    pub fn list_payload_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'payload\\_%' ESCAPE '\\'",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for name in rows {
            out.push(name?.trim_start_matches(TABLE_PREFIX).to_string());
        }
        Ok(out)
    }
}
