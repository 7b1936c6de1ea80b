//! The stowage service facade.
//!
//! [`Service`] wires every stage over one filesystem root: the media
//! pipeline, the JSON router, the indexer, retrieval, deletes, tenant
//! administration, and the reconciler. All state is explicitly
//! constructed here and injected downward; there are no process-global
//! singletons.

use std::io::Read;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use analyzer::Backing;
use chunker::chunk;
use embedding::EmbeddingGateway;
use media::MediaPipeline;
use search::{SearchEngine, SearchOptions, SearchResponse};
use store::{
    Catalog, ChunkRecord, DocumentStore, FileRecord, JsonRecord, OpCtx, ReconcileReport,
    Reconciler, RelationalStore, TenantGuard, TenantRecord, TenantScope,
};
use taxonomy::TaxonomyConfig;

use crate::canonical::{canonical_json_bytes, doc_id};
use crate::config::ServiceConfig;
use crate::error::ServiceError;

/// The assembled ingestion service.
pub struct Service {
    config: ServiceConfig,
    taxonomy: Arc<TaxonomyConfig>,
    catalog: Catalog,
    relational: RelationalStore,
    documents: DocumentStore,
    guard: Arc<TenantGuard>,
    media: MediaPipeline,
    gateway: Arc<dyn EmbeddingGateway>,
    search: SearchEngine,
    /// Per-source advisory locks serializing reindex.
    index_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Service {
    /// Validate the configuration, open the stores, and rebuild the
    /// search caches from the chunk catalog.
    ///
    /// A gateway whose dimension disagrees with the configured `D` is a
    /// fatal startup error.
    pub fn open(
        config: ServiceConfig,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let taxonomy = Arc::new(config.load_taxonomy()?);
        if gateway.dimension() != config.embedding.dimension {
            return Err(ServiceError::Internal(format!(
                "embedding gateway dimension {} does not match configured dimension {}",
                gateway.dimension(),
                config.embedding.dimension
            )));
        }

        std::fs::create_dir_all(&config.root_dir)?;
        let catalog = Catalog::open(config.catalog_path())?;
        let relational = RelationalStore::new(&catalog);
        let documents = DocumentStore::open(config.document_store_path())?;
        let guard = Arc::new(TenantGuard::new(catalog.clone()));
        let media = MediaPipeline::new(
            config.root_dir.clone(),
            Arc::clone(&taxonomy),
            catalog.clone(),
            Arc::clone(&guard),
        )?;
        let search = SearchEngine::new(
            catalog.clone(),
            Arc::clone(&gateway),
            config.normalize_vectors,
            config.ann,
            config.tokenizer.clone(),
        );
        let cached = search.rebuild_from_catalog()?;
        info!(
            root = %config.root_dir.display(),
            cached_vectors = cached,
            dimension = gateway.dimension(),
            "service_opened"
        );

        Ok(Self {
            config,
            taxonomy,
            catalog,
            relational,
            documents,
            guard,
            media,
            gateway,
            search,
            index_locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &TaxonomyConfig {
        &self.taxonomy
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn guard(&self) -> &TenantGuard {
        &self.guard
    }

    fn scope(&self, tenant_id: &str) -> Result<TenantScope, ServiceError> {
        Ok(self.guard.scope(tenant_id)?)
    }

    // ── tenant administration ───────────────────────────────────────────

    pub fn create_tenant(&self, tenant_id: &str, quota_bytes: u64) -> Result<(), ServiceError> {
        self.catalog.upsert_tenant(tenant_id, quota_bytes)?;
        Ok(())
    }

    pub fn set_tenant_quota(&self, tenant_id: &str, quota_bytes: u64) -> Result<(), ServiceError> {
        self.catalog.upsert_tenant(tenant_id, quota_bytes)?;
        Ok(())
    }

    pub fn set_tenant_active(&self, tenant_id: &str, active: bool) -> Result<(), ServiceError> {
        self.catalog.set_tenant_active(tenant_id, active)?;
        Ok(())
    }

    pub fn tenant(&self, tenant_id: &str) -> Result<Option<TenantRecord>, ServiceError> {
        Ok(self.catalog.tenant(tenant_id)?)
    }

    // ── media ───────────────────────────────────────────────────────────

    /// Ingest a binary artifact stream. See [`media`] for the pipeline
    /// contract.
    pub fn ingest_media(
        &self,
        tenant_id: &str,
        reader: &mut dyn Read,
        declared_name: &str,
        declared_mime: Option<&str>,
        comment: Option<&str>,
        ctx: &OpCtx,
    ) -> Result<FileRecord, ServiceError> {
        Ok(self
            .media
            .ingest(tenant_id, reader, declared_name, declared_mime, comment, ctx)?)
    }

    /// Fetch a stored artifact's descriptor and bytes.
    pub fn fetch_media(
        &self,
        tenant_id: &str,
        file_id: &str,
    ) -> Result<(FileRecord, Vec<u8>), ServiceError> {
        let scope = self.scope(tenant_id)?;
        let record = self
            .catalog
            .file(&scope, file_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("file {file_id}")))?;
        let bytes = self.media.read_bytes(&record)?;
        Ok((record, bytes))
    }

    pub fn list_files(&self, tenant_id: &str) -> Result<Vec<FileRecord>, ServiceError> {
        let scope = self.scope(tenant_id)?;
        Ok(self.catalog.list_files(&scope)?)
    }

    /// Delete an artifact: catalog row, usage refund, chunks, canonical
    /// bytes, derivatives, and search-cache entries.
    pub fn delete_file(&self, tenant_id: &str, file_id: &str) -> Result<(), ServiceError> {
        let scope = self.scope(tenant_id)?;
        let (record, purged_chunks) = self.catalog.delete_file(&scope, file_id)?;
        self.media.remove_artifacts(&record);
        self.search.evict_source(file_id, &purged_chunks);
        info!(tenant_id = %tenant_id, file_id = %file_id, "file_deleted");
        Ok(())
    }

    // ── json routing (analyzer + router/persister) ──────────────────────

    /// Route a JSON tree to its backing store and catalog it.
    pub fn ingest_json(
        &self,
        tenant_id: &str,
        tree: &Value,
        tags: &[String],
        ctx: &OpCtx,
    ) -> Result<JsonRecord, ServiceError> {
        let span = info_span!("json.ingest", tenant_id = %tenant_id);
        let _guard = span.enter();
        let start = std::time::Instant::now();

        match self.ingest_json_inner(tenant_id, tree, tags, ctx) {
            Ok(record) => {
                info!(
                    doc_id = %record.id,
                    backing = %record.backing,
                    confidence = record.confidence,
                    size_bytes = record.size_bytes,
                    elapsed_micros = start.elapsed().as_micros() as u64,
                    "json_ingest_success"
                );
                Ok(record)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    elapsed_micros = start.elapsed().as_micros() as u64,
                    "json_ingest_failure"
                );
                Err(err)
            }
        }
    }

    fn ingest_json_inner(
        &self,
        tenant_id: &str,
        tree: &Value,
        tags: &[String],
        ctx: &OpCtx,
    ) -> Result<JsonRecord, ServiceError> {
        ctx.check()?;
        let analysis = analyzer::analyze_and_decide(tree);
        let canonical = canonical_json_bytes(tree);
        let size_bytes = canonical.len() as u64;
        let created_at = Utc::now();
        let id = doc_id(&canonical, created_at);

        // Content-derived ids make same-second duplicate ingests of the
        // same tree a no-op for the same tenant.
        if let Ok(scope) = self.guard.scope(tenant_id) {
            if let Some(existing) = self.catalog.json(&scope, &id)? {
                debug!(doc_id = %id, "json_ingest_duplicate_noop");
                return Ok(existing);
            }
        }

        let token = self.guard.admit(tenant_id, size_bytes)?;
        ctx.check()?;

        let backing = analysis.verdict.backing;
        match backing {
            Backing::Relational => {
                self.relational
                    .create_payload(&id, tenant_id, created_at, tree)?;
            }
            Backing::Document => {
                self.documents.put(&id, tenant_id, created_at, tags, tree)?;
            }
        }

        let record = JsonRecord {
            id: id.clone(),
            tenant: tenant_id.to_string(),
            backing: backing.to_string(),
            confidence: analysis.verdict.confidence,
            metrics: json!({
                "metrics": analysis.metrics,
                "sql_score": analysis.verdict.sql_score,
                "nosql_score": analysis.verdict.nosql_score,
                "reasons": analysis.verdict.reasons,
                "root_array": tree.is_array(),
            }),
            tags: tags.to_vec(),
            size_bytes,
            created_at,
            orphaned: false,
        };

        // Commit is the non-cancellable point. A failure here leaves an
        // orphan payload for the reconciler; compensate eagerly anyway.
        if let Err(err) = self.catalog.commit_json(&record) {
            warn!(doc_id = %id, error = %err, "json_catalog_commit_failed_compensating");
            let compensation = match backing {
                Backing::Relational => self.relational.drop_payload(&id).map(|_| ()),
                Backing::Document => self.documents.delete(&id).map(|_| ()),
            };
            if let Err(comp_err) = compensation {
                warn!(doc_id = %id, error = %comp_err, "json_payload_compensation_failed");
            }
            self.guard.release(token);
            return Err(err.into());
        }
        self.guard.commit(token);
        Ok(record)
    }

    /// Reconstruct the original tree from whichever store holds it.
    pub fn fetch_json(&self, tenant_id: &str, id: &str) -> Result<Value, ServiceError> {
        let scope = self.scope(tenant_id)?;
        let record = self
            .catalog
            .json(&scope, id)?
            .ok_or_else(|| ServiceError::NotFound(format!("json document {id}")))?;

        match record.backing.as_str() {
            "relational" => {
                let rows = self.relational.fetch_payload(&scope, id)?;
                let root_array = record.metrics["root_array"].as_bool().unwrap_or(false);
                if root_array {
                    Ok(Value::Array(rows))
                } else {
                    rows.into_iter()
                        .next()
                        .ok_or_else(|| ServiceError::NotFound(format!("payload rows for {id}")))
                }
            }
            _ => self
                .documents
                .get(&scope, id)?
                .ok_or_else(|| ServiceError::NotFound(format!("document payload {id}"))),
        }
    }

    pub fn list_json(&self, tenant_id: &str) -> Result<Vec<JsonRecord>, ServiceError> {
        let scope = self.scope(tenant_id)?;
        Ok(self.catalog.list_json(&scope)?)
    }

    /// Delete a routed document: catalog row first (authoritative), then
    /// the payload; a failed payload drop is left to the reconciler.
    pub fn delete_json(&self, tenant_id: &str, id: &str) -> Result<(), ServiceError> {
        let scope = self.scope(tenant_id)?;
        let record = self.catalog.delete_json(&scope, id)?;
        let dropped = match record.backing.as_str() {
            "relational" => self.relational.drop_payload(id).map(|_| ()),
            _ => self.documents.delete(id).map(|_| ()),
        };
        if let Err(err) = dropped {
            warn!(doc_id = %id, error = %err, "json_payload_drop_failed_reconciler_will_sweep");
        }
        info!(tenant_id = %tenant_id, doc_id = %id, "json_deleted");
        Ok(())
    }

    // ── indexing ────────────────────────────────────────────────────────

    fn index_lock(&self, file_id: &str) -> Arc<Mutex<()>> {
        self.index_locks
            .entry(file_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Chunk, embed, and index a stored artifact's text. Serialized per
    /// source; a reindex against unchanged content is a no-op, so a
    /// caller that waited on the advisory lock observes the in-flight
    /// result instead of embedding again. Returns the chunk count.
    pub fn index_file(
        &self,
        tenant_id: &str,
        file_id: &str,
        ctx: &OpCtx,
    ) -> Result<usize, ServiceError> {
        let span = info_span!("index.file", tenant_id = %tenant_id, file_id = %file_id);
        let _span_guard = span.enter();

        let lock = self.index_lock(file_id);
        let _serialized = lock.lock().unwrap_or_else(|p| p.into_inner());

        let scope = self.scope(tenant_id)?;
        let record = self
            .catalog
            .file(&scope, file_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("file {file_id}")))?;

        ctx.check()?;
        let bytes = self.media.read_bytes(&record)?;
        let text = String::from_utf8(bytes).map_err(|_| {
            ServiceError::Validation(format!(
                "file {file_id} is not UTF-8 text and cannot be indexed"
            ))
        })?;
        let text_sha = hex::encode(Sha256::digest(text.as_bytes()));

        if record.indexed && record.indexed_sha.as_deref() == Some(text_sha.as_str()) {
            debug!("index_unchanged_noop");
            return Ok(self.catalog.chunks_for_source(&scope, file_id)?.len());
        }

        let pieces = chunk(&text, &self.config.chunker);
        ctx.check()?;
        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let vectors = self.gateway.embed_batch(&texts)?;

        let chunks: Vec<ChunkRecord> = pieces
            .iter()
            .zip(vectors)
            .map(|(piece, vector)| ChunkRecord {
                id: format!("chunk_{}", Uuid::new_v4().simple()),
                source_file_id: file_id.to_string(),
                tenant: tenant_id.to_string(),
                ordinal: piece.ordinal,
                text: piece.text.clone(),
                vector,
                meta: json!({"start": piece.start, "end": piece.end}),
            })
            .collect();

        // The chunk batch is atomic per source; caches update after the
        // commit.
        let purged = self
            .catalog
            .replace_chunks(&scope, file_id, &chunks, &text_sha)?;
        self.search
            .apply_chunk_write(tenant_id, file_id, &text, &purged, &chunks)?;

        info!(chunks = chunks.len(), purged = purged.len(), "index_file_complete");
        Ok(chunks.len())
    }

    /// Force a fresh chunk/embed pass even for unchanged content.
    pub fn reindex_file(
        &self,
        tenant_id: &str,
        file_id: &str,
        ctx: &OpCtx,
    ) -> Result<usize, ServiceError> {
        {
            let scope = self.scope(tenant_id)?;
            // Clearing the digest makes the next pass treat content as
            // changed; the pass itself serializes on the advisory lock.
            let lock = self.index_lock(file_id);
            let _serialized = lock.lock().unwrap_or_else(|p| p.into_inner());
            self.catalog.clear_indexed_sha(&scope, file_id)?;
        }
        self.index_file(tenant_id, file_id, ctx)
    }

    // ── retrieval ───────────────────────────────────────────────────────

    pub fn search(
        &self,
        tenant_id: &str,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SearchResponse, ServiceError> {
        let scope = self.scope(tenant_id)?;
        Ok(self.search.search(&scope, query, opts)?)
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    // ── reconciliation ──────────────────────────────────────────────────

    /// Run one reconciler sweep across the payload stores and the
    /// filesystem.
    pub fn reconcile(&self) -> Result<ReconcileReport, ServiceError> {
        let reconciler = Reconciler::new(
            self.catalog.clone(),
            self.relational.clone(),
            self.documents.clone(),
            self.config.root_dir.clone(),
        );
        Ok(reconciler.sweep()?)
    }
}
