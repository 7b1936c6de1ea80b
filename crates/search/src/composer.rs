//! Retrieval composer.
//!
//! One entry point for queries: route to the prefix index (short queries
//! or `mode = prefix`), the vector path (embed then kNN), or both
//! (`hybrid`, deduplicated by source with semantic hits ranked first).
//! Every call appends a `query_log` row from a detached thread; logging
//! failures are warnings, never query failures.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use embedding::EmbeddingGateway;
use store::{Catalog, ChunkRecord, QueryLogRecord, TenantScope};

use crate::ann::AnnConfig;
use crate::error::SearchError;
use crate::tokenize::TokenizerConfig;
use crate::trie::{PrefixIndex, TokenHit};
use crate::vector::{ChunkHit, SearchFilter, VectorIndex};

/// Queries shorter than this always take the prefix path.
const MIN_SEMANTIC_QUERY_CHARS: usize = 3;

/// How a query should be routed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Prefix,
    Semantic,
    Hybrid,
}

/// Query options.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub top_k: usize,
    /// Optional category restriction for the semantic arm.
    pub categories: Option<Vec<String>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            top_k: 10,
            categories: None,
        }
    }
}

/// One hit: token-level (prefix arm) or chunk-level (semantic arm).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchHit {
    Token {
        token: String,
        frequency: u64,
        source_file_ids: Vec<String>,
    },
    Chunk {
        chunk_id: String,
        source_file_id: String,
        ordinal: u32,
        text: String,
        distance: f32,
    },
}

/// Ordered response plus the route actually taken.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub mode: SearchMode,
}

fn token_hit(hit: TokenHit) -> SearchHit {
    SearchHit::Token {
        token: hit.token,
        frequency: hit.frequency,
        source_file_ids: hit.source_file_ids,
    }
}

fn chunk_hit(hit: ChunkHit) -> SearchHit {
    SearchHit::Chunk {
        chunk_id: hit.chunk.id,
        source_file_id: hit.chunk.source_file_id,
        ordinal: hit.chunk.ordinal,
        text: hit.chunk.text,
        distance: hit.distance,
    }
}

/// The retrieval composer: owns the vector index and the prefix index,
/// takes the embedding gateway as a dependency.
pub struct SearchEngine {
    catalog: Catalog,
    gateway: Arc<dyn EmbeddingGateway>,
    vectors: VectorIndex,
    prefix: PrefixIndex,
}

impl SearchEngine {
    pub fn new(
        catalog: Catalog,
        gateway: Arc<dyn EmbeddingGateway>,
        normalize: bool,
        ann: AnnConfig,
        tokenizer: TokenizerConfig,
    ) -> Self {
        let vectors = VectorIndex::new(catalog.clone(), gateway.dimension(), normalize, ann);
        Self {
            catalog,
            gateway,
            vectors,
            prefix: PrefixIndex::new(tokenizer),
        }
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn prefix(&self) -> &PrefixIndex {
        &self.prefix
    }

    /// Rebuild both caches from the chunk catalog (startup path).
    pub fn rebuild_from_catalog(&self) -> Result<usize, SearchError> {
        let count = self.vectors.rebuild_from_catalog()?;
        let chunks = self.catalog.all_chunks()?;
        let mut per_source: std::collections::HashMap<(String, String), String> =
            std::collections::HashMap::new();
        for ChunkRecord {
            source_file_id,
            tenant,
            text,
            ..
        } in chunks
        {
            let entry = per_source.entry((tenant, source_file_id)).or_default();
            if !entry.is_empty() {
                entry.push(' ');
            }
            entry.push_str(&text);
        }
        for ((tenant, source_file_id), text) in per_source {
            self.prefix.index_text(&tenant, &source_file_id, &text);
        }
        Ok(count)
    }

    /// Fold a committed chunk rewrite into both caches.
    pub fn apply_chunk_write(
        &self,
        tenant_id: &str,
        source_file_id: &str,
        source_text: &str,
        purged: &[String],
        chunks: &[ChunkRecord],
    ) -> Result<(), SearchError> {
        self.vectors.apply_chunk_write(purged, chunks)?;
        self.prefix.index_text(tenant_id, source_file_id, source_text);
        Ok(())
    }

    /// Evict a deleted source from both caches.
    pub fn evict_source(&self, source_file_id: &str, chunk_ids: &[String]) {
        self.vectors.evict(chunk_ids);
        self.prefix.remove_file(source_file_id);
    }

    /// Route a query. See the module docs for the decision rules.
    pub fn search(
        &self,
        scope: &TenantScope,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<SearchResponse, SearchError> {
        let start = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Validation("empty query".into()));
        }
        let span = info_span!("search.query", tenant_id = %scope.tenant_id(), mode = ?opts.mode);
        let _guard = span.enter();

        let effective_mode = if opts.mode == SearchMode::Prefix
            || query.chars().count() < MIN_SEMANTIC_QUERY_CHARS
        {
            SearchMode::Prefix
        } else {
            opts.mode
        };

        let (hits, query_vector) = match effective_mode {
            SearchMode::Prefix => (self.prefix_hits(scope, query, opts.top_k), None),
            SearchMode::Semantic => {
                let (hits, vector) = self.semantic_hits(scope, query, opts)?;
                (hits, Some(vector))
            }
            SearchMode::Hybrid => {
                let (semantic, vector) = self.semantic_hits(scope, query, opts)?;
                let mut covered: std::collections::HashSet<String> = semantic
                    .iter()
                    .filter_map(|hit| match hit {
                        SearchHit::Chunk { source_file_id, .. } => Some(source_file_id.clone()),
                        SearchHit::Token { .. } => None,
                    })
                    .collect();

                let mut merged = semantic;
                for hit in self.prefix_hits(scope, query, opts.top_k) {
                    if let SearchHit::Token {
                        token,
                        frequency,
                        source_file_ids,
                    } = hit
                    {
                        let fresh: Vec<String> = source_file_ids
                            .into_iter()
                            .filter(|id| !covered.contains(id))
                            .collect();
                        if fresh.is_empty() {
                            continue;
                        }
                        covered.extend(fresh.iter().cloned());
                        merged.push(SearchHit::Token {
                            token,
                            frequency,
                            source_file_ids: fresh,
                        });
                    }
                }
                (merged, Some(vector))
            }
        };

        self.log_query_detached(scope, query, query_vector, hits.len());
        info!(
            hits = hits.len(),
            effective_mode = ?effective_mode,
            elapsed_micros = start.elapsed().as_micros() as u64,
            "search_complete"
        );
        Ok(SearchResponse {
            hits,
            mode: effective_mode,
        })
    }

    fn prefix_hits(&self, scope: &TenantScope, query: &str, top_k: usize) -> Vec<SearchHit> {
        self.prefix
            .query_hits(scope, query, top_k)
            .into_iter()
            .map(token_hit)
            .collect()
    }

    fn semantic_hits(
        &self,
        scope: &TenantScope,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<(Vec<SearchHit>, Vec<f32>), SearchError> {
        let vector = self.gateway.embed(query)?;
        let filter = SearchFilter {
            categories: opts.categories.clone(),
            source_file_ids: None,
        };
        let hits = self.vectors.knn(scope, &vector, opts.top_k, &filter)?;
        Ok((hits.into_iter().map(chunk_hit).collect(), vector))
    }

    fn log_query_detached(
        &self,
        scope: &TenantScope,
        query: &str,
        vector: Option<Vec<f32>>,
        result_count: usize,
    ) {
        let catalog = self.catalog.clone();
        let record = QueryLogRecord {
            id: format!("q_{}", Uuid::new_v4().simple()),
            tenant: scope.tenant_id().to_string(),
            text: query.to_string(),
            vector,
            created_at: Utc::now(),
            result_count: result_count as u32,
        };
        std::thread::spawn(move || {
            if let Err(err) = catalog.log_query(&record) {
                warn!(error = %err, "query_log_write_failed");
            }
        });
    }
}
