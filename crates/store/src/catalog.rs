//! Authoritative catalog tables.
//!
//! The catalog lives in SQLite so tenant checks and cross-entity joins are
//! atomic: `tenant`, `catalog_file`, `catalog_json`, `chunk`, and
//! `query_log` share one database file, and every commit that moves tenant
//! usage runs in the same transaction as the row it accounts for. Chunk
//! vectors are stored as little-endian `f32` blobs; the nearest-neighbor
//! structure over them is a cache owned by the search layer, rebuilt from
//! this table on startup.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::tenant::TenantScope;

/// One thumbnail derivative of a stored file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThumbDescriptor {
    /// `small`, `medium`, or `large`.
    pub label: String,
    /// Path relative to the storage root.
    pub path: String,
    pub width: u32,
    pub height: u32,
}

/// Tenant row: quota, accumulated usage, active flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantRecord {
    pub id: String,
    pub quota_bytes: u64,
    pub usage_bytes: u64,
    pub active: bool,
}

/// Catalog row for a stored binary artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: String,
    pub tenant: String,
    pub original_name: String,
    pub category: String,
    pub mime: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Canonical path relative to the storage root.
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub indexed: bool,
    /// Digest of the text the chunks were derived from; lets reindex
    /// no-op when content is unchanged.
    pub indexed_sha: Option<String>,
    pub thumbs: Vec<ThumbDescriptor>,
    pub comment: Option<String>,
    pub orphaned: bool,
    /// Extracted media metadata (dimensions, color mode, EXIF) as a free
    /// JSON object; `{}` for categories with nothing to extract.
    pub meta: serde_json::Value,
}

/// Catalog row for a routed JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRecord {
    pub id: String,
    pub tenant: String,
    /// `relational` or `document`.
    pub backing: String,
    pub confidence: f64,
    pub metrics: serde_json::Value,
    pub tags: Vec<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub orphaned: bool,
}

/// One indexed chunk of a stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub source_file_id: String,
    pub tenant: String,
    pub ordinal: u32,
    pub text: String,
    pub vector: Vec<f32>,
    pub meta: serde_json::Value,
}

/// Append-only search analytics row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryLogRecord {
    pub id: String,
    pub tenant: String,
    pub text: String,
    pub vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub result_count: u32,
}

/// Encode a vector as a little-endian `f32` blob.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian `f32` blob.
pub fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "vector blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(m: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(m)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {m} out of range")))
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tenant (
    id          TEXT PRIMARY KEY,
    quota_bytes INTEGER NOT NULL,
    usage_bytes INTEGER NOT NULL DEFAULT 0,
    active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS catalog_file (
    id            TEXT PRIMARY KEY,
    tenant        TEXT NOT NULL,
    original_name TEXT NOT NULL,
    category      TEXT NOT NULL,
    mime          TEXT NOT NULL,
    size          INTEGER NOT NULL,
    sha256        TEXT NOT NULL,
    path          TEXT NOT NULL,
    created_at    INTEGER NOT NULL,
    indexed       INTEGER NOT NULL DEFAULT 0,
    indexed_sha   TEXT,
    thumbs_json   TEXT NOT NULL DEFAULT '[]',
    comment       TEXT,
    orphaned      INTEGER NOT NULL DEFAULT 0,
    meta_json     TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_catalog_file_tenant_created
    ON catalog_file(tenant, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_catalog_file_category
    ON catalog_file(category);
CREATE INDEX IF NOT EXISTS idx_catalog_file_tenant_sha
    ON catalog_file(tenant, sha256);

CREATE TABLE IF NOT EXISTS catalog_json (
    id           TEXT PRIMARY KEY,
    tenant       TEXT NOT NULL,
    backing      TEXT NOT NULL,
    confidence   REAL NOT NULL,
    metrics_json TEXT NOT NULL,
    tags         TEXT NOT NULL DEFAULT '[]',
    size         INTEGER NOT NULL,
    created_at   INTEGER NOT NULL,
    orphaned     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_catalog_json_tenant_created
    ON catalog_json(tenant, created_at DESC);

CREATE TABLE IF NOT EXISTS chunk (
    id             TEXT PRIMARY KEY,
    source_file_id TEXT NOT NULL,
    tenant         TEXT NOT NULL,
    ordinal        INTEGER NOT NULL,
    text           TEXT NOT NULL,
    vector         BLOB NOT NULL,
    meta_json      TEXT NOT NULL DEFAULT '{}'
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_chunk_source_ordinal
    ON chunk(source_file_id, ordinal);
CREATE INDEX IF NOT EXISTS idx_chunk_tenant ON chunk(tenant);

CREATE TABLE IF NOT EXISTS query_log (
    id           TEXT PRIMARY KEY,
    tenant       TEXT NOT NULL,
    text         TEXT NOT NULL,
    vector       BLOB,
    created_at   INTEGER NOT NULL,
    result_count INTEGER NOT NULL
);
";

/// Handle to the catalog database. Cheap to clone; all clones share one
/// serialized connection.
#[derive(Clone)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    /// Open (or create) the catalog at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn)
    }

    /// Ephemeral in-memory catalog, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-query; the
        // connection itself is still serviceable.
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Share the underlying connection with the relational payload store.
    pub(crate) fn shared_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    // ── tenants ─────────────────────────────────────────────────────────

    /// Create a tenant or update its quota, preserving usage.
    pub fn upsert_tenant(&self, id: &str, quota_bytes: u64) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO tenant (id, quota_bytes, usage_bytes, active) VALUES (?1, ?2, 0, 1)
             ON CONFLICT(id) DO UPDATE SET quota_bytes = excluded.quota_bytes",
            params![id, quota_bytes as i64],
        )?;
        Ok(())
    }

    pub fn set_tenant_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        let changed = self.lock().execute(
            "UPDATE tenant SET active = ?2 WHERE id = ?1",
            params![id, active as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::UnknownTenant(id.to_string()));
        }
        Ok(())
    }

    pub fn tenant(&self, id: &str) -> Result<Option<TenantRecord>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, quota_bytes, usage_bytes, active FROM tenant WHERE id = ?1",
                params![id],
                |row| {
                    Ok(TenantRecord {
                        id: row.get(0)?,
                        quota_bytes: row.get::<_, i64>(1)? as u64,
                        usage_bytes: row.get::<_, i64>(2)? as u64,
                        active: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Usage update with the quota re-check folded into the statement; the
    /// guard's commit path runs this inside the same transaction as the
    /// catalog row it accounts for.
    fn add_usage_in(
        conn: &Connection,
        tenant: &str,
        delta: u64,
    ) -> Result<(), StoreError> {
        let changed = conn.execute(
            "UPDATE tenant SET usage_bytes = usage_bytes + ?2
             WHERE id = ?1 AND active = 1 AND usage_bytes + ?2 <= quota_bytes",
            params![tenant, delta as i64],
        )?;
        if changed == 1 {
            return Ok(());
        }
        // Figure out why the guarded update refused.
        let record = conn
            .query_row(
                "SELECT quota_bytes, usage_bytes, active FROM tenant WHERE id = ?1",
                params![tenant],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? != 0,
                    ))
                },
            )
            .optional()?;
        match record {
            None => Err(StoreError::UnknownTenant(tenant.to_string())),
            Some((_, _, false)) => Err(StoreError::Inactive(tenant.to_string())),
            Some((quota, usage, true)) => Err(StoreError::QuotaExceeded {
                tenant: tenant.to_string(),
                usage,
                requested: delta,
                quota,
            }),
        }
    }

    fn subtract_usage_in(conn: &Connection, tenant: &str, delta: u64) -> Result<(), StoreError> {
        conn.execute(
            "UPDATE tenant SET usage_bytes = MAX(usage_bytes - ?2, 0) WHERE id = ?1",
            params![tenant, delta as i64],
        )?;
        Ok(())
    }

    // ── files ───────────────────────────────────────────────────────────

    /// Insert a file row and charge the tenant in one transaction. This is
    /// the commit point of a media ingest: if the quota re-check fails the
    /// row never becomes visible.
    pub fn commit_file(&self, record: &FileRecord) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::add_usage_in(&tx, &record.tenant, record.size_bytes)?;
        tx.execute(
            "INSERT INTO catalog_file
               (id, tenant, original_name, category, mime, size, sha256, path,
                created_at, indexed, indexed_sha, thumbs_json, comment, orphaned, meta_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, ?10, ?11, 0, ?12)",
            params![
                record.id,
                record.tenant,
                record.original_name,
                record.category,
                record.mime,
                record.size_bytes as i64,
                record.sha256,
                record.path,
                millis(record.created_at),
                serde_json::to_string(&record.thumbs)?,
                record.comment,
                serde_json::to_string(&record.meta)?,
            ],
        )?;
        tx.commit()?;
        debug!(file_id = %record.id, tenant = %record.tenant, "catalog_file_committed");
        Ok(())
    }

    fn file_from_row(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(FileRecord, String, i64, String)> {
        let thumbs_json: String = row.get(11)?;
        let created: i64 = row.get(8)?;
        let meta_json: String = row.get(14)?;
        Ok((
            FileRecord {
                id: row.get(0)?,
                tenant: row.get(1)?,
                original_name: row.get(2)?,
                category: row.get(3)?,
                mime: row.get(4)?,
                size_bytes: row.get::<_, i64>(5)? as u64,
                sha256: row.get(6)?,
                path: row.get(7)?,
                created_at: Utc::now(), // replaced below
                indexed: row.get::<_, i64>(9)? != 0,
                indexed_sha: row.get(10)?,
                thumbs: Vec::new(), // replaced below
                comment: row.get(12)?,
                orphaned: row.get::<_, i64>(13)? != 0,
                meta: serde_json::Value::Null, // replaced below
            },
            thumbs_json,
            created,
            meta_json,
        ))
    }

    fn finish_file(parts: (FileRecord, String, i64, String)) -> Result<FileRecord, StoreError> {
        let (mut record, thumbs_json, created, meta_json) = parts;
        record.thumbs = serde_json::from_str(&thumbs_json)?;
        record.created_at = from_millis(created)?;
        record.meta = serde_json::from_str(&meta_json)?;
        Ok(record)
    }

    const FILE_COLUMNS: &'static str = "id, tenant, original_name, category, mime, size, sha256, \
         path, created_at, indexed, indexed_sha, thumbs_json, comment, orphaned, meta_json";

    pub fn file(&self, scope: &TenantScope, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM catalog_file WHERE id = ?1 AND tenant = ?2",
            Self::FILE_COLUMNS
        );
        let parts = conn
            .query_row(&sql, params![id, scope.tenant_id()], Self::file_from_row)
            .optional()?;
        parts.map(Self::finish_file).transpose()
    }

    pub fn list_files(&self, scope: &TenantScope) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM catalog_file WHERE tenant = ?1 ORDER BY created_at DESC",
            Self::FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![scope.tenant_id()], Self::file_from_row)?;
        rows.map(|r| Self::finish_file(r?)).collect()
    }

    /// Every file row, tenancy ignored. Reconciler only.
    pub fn all_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!("SELECT {} FROM catalog_file", Self::FILE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::file_from_row)?;
        rows.map(|r| Self::finish_file(r?)).collect()
    }

    pub fn set_file_thumbs(
        &self,
        scope: &TenantScope,
        id: &str,
        thumbs: &[ThumbDescriptor],
    ) -> Result<(), StoreError> {
        let changed = self.lock().execute(
            "UPDATE catalog_file SET thumbs_json = ?3 WHERE id = ?1 AND tenant = ?2",
            params![id, scope.tenant_id(), serde_json::to_string(thumbs)?],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("file {id}")));
        }
        Ok(())
    }

    /// Forget the indexed-content digest so the next index pass treats
    /// the content as changed.
    pub fn clear_indexed_sha(&self, scope: &TenantScope, id: &str) -> Result<(), StoreError> {
        let changed = self.lock().execute(
            "UPDATE catalog_file SET indexed_sha = NULL WHERE id = ?1 AND tenant = ?2",
            params![id, scope.tenant_id()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("file {id}")));
        }
        Ok(())
    }

    pub fn mark_file_orphaned(&self, id: &str) -> Result<(), StoreError> {
        self.lock().execute(
            "UPDATE catalog_file SET orphaned = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Tenant-scoped delete: removes the row, its chunks, and refunds
    /// usage in one transaction. Returns the record and the purged chunk
    /// ids so in-memory caches can evict.
    pub fn delete_file(
        &self,
        scope: &TenantScope,
        id: &str,
    ) -> Result<(FileRecord, Vec<String>), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let sql = format!(
            "SELECT {} FROM catalog_file WHERE id = ?1 AND tenant = ?2",
            Self::FILE_COLUMNS
        );
        let parts = tx
            .query_row(&sql, params![id, scope.tenant_id()], Self::file_from_row)
            .optional()?;
        let record = match parts {
            Some(parts) => Self::finish_file(parts)?,
            None => return Err(StoreError::NotFound(format!("file {id}"))),
        };

        let mut chunk_ids = Vec::new();
        {
            let mut stmt = tx.prepare("SELECT id FROM chunk WHERE source_file_id = ?1")?;
            let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
            for row in rows {
                chunk_ids.push(row?);
            }
        }
        tx.execute("DELETE FROM chunk WHERE source_file_id = ?1", params![id])?;
        tx.execute("DELETE FROM catalog_file WHERE id = ?1", params![id])?;
        Self::subtract_usage_in(&tx, &record.tenant, record.size_bytes)?;
        tx.commit()?;
        Ok((record, chunk_ids))
    }

    // ── json documents ──────────────────────────────────────────────────

    /// Insert a JSON catalog row and charge the tenant in one transaction.
    pub fn commit_json(&self, record: &JsonRecord) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::add_usage_in(&tx, &record.tenant, record.size_bytes)?;
        tx.execute(
            "INSERT INTO catalog_json
               (id, tenant, backing, confidence, metrics_json, tags, size, created_at, orphaned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                record.id,
                record.tenant,
                record.backing,
                record.confidence,
                serde_json::to_string(&record.metrics)?,
                serde_json::to_string(&record.tags)?,
                record.size_bytes as i64,
                millis(record.created_at),
            ],
        )?;
        tx.commit()?;
        debug!(doc_id = %record.id, tenant = %record.tenant, backing = %record.backing, "catalog_json_committed");
        Ok(())
    }

    fn json_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(JsonRecord, String, String, i64)> {
        Ok((
            JsonRecord {
                id: row.get(0)?,
                tenant: row.get(1)?,
                backing: row.get(2)?,
                confidence: row.get(3)?,
                metrics: serde_json::Value::Null, // replaced below
                tags: Vec::new(),                 // replaced below
                size_bytes: row.get::<_, i64>(6)? as u64,
                created_at: Utc::now(), // replaced below
                orphaned: row.get::<_, i64>(8)? != 0,
            },
            row.get(4)?,
            row.get(5)?,
            row.get(7)?,
        ))
    }

    fn finish_json(parts: (JsonRecord, String, String, i64)) -> Result<JsonRecord, StoreError> {
        let (mut record, metrics_json, tags_json, created) = parts;
        record.metrics = serde_json::from_str(&metrics_json)?;
        record.tags = serde_json::from_str(&tags_json)?;
        record.created_at = from_millis(created)?;
        Ok(record)
    }

    const JSON_COLUMNS: &'static str =
        "id, tenant, backing, confidence, metrics_json, tags, size, created_at, orphaned";

    pub fn json(&self, scope: &TenantScope, id: &str) -> Result<Option<JsonRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM catalog_json WHERE id = ?1 AND tenant = ?2",
            Self::JSON_COLUMNS
        );
        let parts = conn
            .query_row(&sql, params![id, scope.tenant_id()], Self::json_from_row)
            .optional()?;
        parts.map(Self::finish_json).transpose()
    }

    pub fn list_json(&self, scope: &TenantScope) -> Result<Vec<JsonRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM catalog_json WHERE tenant = ?1 ORDER BY created_at DESC",
            Self::JSON_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![scope.tenant_id()], Self::json_from_row)?;
        rows.map(|r| Self::finish_json(r?)).collect()
    }

    /// `(id, backing)` of every JSON row, tenancy ignored. Reconciler only.
    pub fn all_json_ids(&self) -> Result<Vec<(String, String)>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, backing FROM catalog_json")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn mark_json_orphaned(&self, id: &str) -> Result<(), StoreError> {
        self.lock().execute(
            "UPDATE catalog_json SET orphaned = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Tenant-scoped delete with usage refund. The payload-store side is
    /// the caller's responsibility (and the reconciler's backstop).
    pub fn delete_json(&self, scope: &TenantScope, id: &str) -> Result<JsonRecord, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let sql = format!(
            "SELECT {} FROM catalog_json WHERE id = ?1 AND tenant = ?2",
            Self::JSON_COLUMNS
        );
        let parts = tx
            .query_row(&sql, params![id, scope.tenant_id()], Self::json_from_row)
            .optional()?;
        let record = match parts {
            Some(parts) => Self::finish_json(parts)?,
            None => return Err(StoreError::NotFound(format!("json document {id}"))),
        };
        tx.execute("DELETE FROM catalog_json WHERE id = ?1", params![id])?;
        Self::subtract_usage_in(&tx, &record.tenant, record.size_bytes)?;
        tx.commit()?;
        Ok(record)
    }

    // ── chunks ──────────────────────────────────────────────────────────

    /// Replace the chunk set of one source in a single transaction: old
    /// chunks purged, new batch written, `indexed` flipped. Returns the
    /// purged chunk ids for cache eviction.
    pub fn replace_chunks(
        &self,
        scope: &TenantScope,
        source_file_id: &str,
        chunks: &[ChunkRecord],
        indexed_sha: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT tenant FROM catalog_file WHERE id = ?1",
                params![source_file_id],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            None => {
                return Err(StoreError::NotFound(format!("file {source_file_id}")));
            }
            Some(owner) if owner != scope.tenant_id() => {
                return Err(StoreError::NotFound(format!("file {source_file_id}")));
            }
            Some(_) => {}
        }

        let mut purged = Vec::new();
        {
            let mut stmt = tx.prepare("SELECT id FROM chunk WHERE source_file_id = ?1")?;
            let rows = stmt.query_map(params![source_file_id], |row| row.get::<_, String>(0))?;
            for row in rows {
                purged.push(row?);
            }
        }
        tx.execute(
            "DELETE FROM chunk WHERE source_file_id = ?1",
            params![source_file_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunk (id, source_file_id, tenant, ordinal, text, vector, meta_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    chunk.id,
                    chunk.source_file_id,
                    chunk.tenant,
                    chunk.ordinal,
                    chunk.text,
                    vector_to_blob(&chunk.vector),
                    serde_json::to_string(&chunk.meta)?,
                ])?;
            }
        }
        tx.execute(
            "UPDATE catalog_file SET indexed = 1, indexed_sha = ?2 WHERE id = ?1",
            params![source_file_id, indexed_sha],
        )?;
        tx.commit()?;
        Ok(purged)
    }

    fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ChunkRecord, Vec<u8>, String)> {
        Ok((
            ChunkRecord {
                id: row.get(0)?,
                source_file_id: row.get(1)?,
                tenant: row.get(2)?,
                ordinal: row.get::<_, i64>(3)? as u32,
                text: row.get(4)?,
                vector: Vec::new(),              // replaced below
                meta: serde_json::Value::Null,   // replaced below
            },
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn finish_chunk(parts: (ChunkRecord, Vec<u8>, String)) -> Result<ChunkRecord, StoreError> {
        let (mut chunk, blob, meta_json) = parts;
        chunk.vector = blob_to_vector(&blob)?;
        chunk.meta = serde_json::from_str(&meta_json)?;
        Ok(chunk)
    }

    const CHUNK_COLUMNS: &'static str =
        "id, source_file_id, tenant, ordinal, text, vector, meta_json";

    pub fn chunks_for_source(
        &self,
        scope: &TenantScope,
        source_file_id: &str,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM chunk WHERE source_file_id = ?1 AND tenant = ?2 ORDER BY ordinal",
            Self::CHUNK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![source_file_id, scope.tenant_id()], Self::chunk_from_row)?;
        rows.map(|r| Self::finish_chunk(r?)).collect()
    }

    /// Tenant's chunks, optionally restricted to source categories and/or
    /// an explicit source set. Feeds the exact arm of the vector search.
    pub fn chunks_for_tenant(
        &self,
        scope: &TenantScope,
        categories: Option<&[String]>,
        sources: Option<&[String]>,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut sql = format!(
            "SELECT {} FROM chunk c JOIN catalog_file f ON f.id = c.source_file_id
             WHERE c.tenant = ?",
            Self::CHUNK_COLUMNS
                .split(", ")
                .map(|col| format!("c.{col}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut args: Vec<String> = vec![scope.tenant_id().to_string()];
        if let Some(categories) = categories {
            let marks = vec!["?"; categories.len().max(1)].join(", ");
            sql.push_str(&format!(" AND f.category IN ({marks})"));
            args.extend(categories.iter().cloned());
            if categories.is_empty() {
                args.push(String::new());
            }
        }
        if let Some(sources) = sources {
            let marks = vec!["?"; sources.len().max(1)].join(", ");
            sql.push_str(&format!(" AND c.source_file_id IN ({marks})"));
            args.extend(sources.iter().cloned());
            if sources.is_empty() {
                args.push(String::new());
            }
        }
        sql.push_str(" ORDER BY c.source_file_id, c.ordinal");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), Self::chunk_from_row)?;
        rows.map(|r| Self::finish_chunk(r?)).collect()
    }

    /// Every chunk in the catalog; startup cache rebuild only.
    pub fn all_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {} FROM chunk ORDER BY source_file_id, ordinal",
            Self::CHUNK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::chunk_from_row)?;
        rows.map(|r| Self::finish_chunk(r?)).collect()
    }

    // ── query log ───────────────────────────────────────────────────────

    pub fn log_query(&self, record: &QueryLogRecord) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO query_log (id, tenant, text, vector, created_at, result_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.tenant,
                record.text,
                record.vector.as_deref().map(vector_to_blob),
                millis(record.created_at),
                record.result_count,
            ],
        )?;
        Ok(())
    }

    pub fn query_log_count(&self, scope: &TenantScope) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM query_log WHERE tenant = ?1",
            params![scope.tenant_id()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
