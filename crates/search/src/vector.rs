//! Vector index and kNN search over stored chunks.
//!
//! Chunk vectors are authoritative in the catalog's `chunk` table; this
//! index keeps an in-memory ANN cache over them and answers
//! tenant/category-filtered kNN queries. Distance is L2 end to end; when
//! the system-wide normalization policy is on, stored and query vectors
//! are L2-normalized first, making the ranking cosine-equivalent.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::RwLock;

use tracing::{debug, info};

use embedding::l2_normalize;
use store::{Catalog, ChunkRecord, TenantScope};

use crate::ann::{l2_distance, AnnConfig, AnnIndex};
use crate::error::SearchError;

/// Restriction on a kNN query.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict to chunks whose source file carries one of these
    /// categories.
    pub categories: Option<Vec<String>>,
    /// Restrict to an explicit set of source files.
    pub source_file_ids: Option<Vec<String>>,
}

/// One kNN result.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHit {
    pub chunk: ChunkRecord,
    pub distance: f32,
}

/// Tenant-aware vector search over the chunk catalog.
pub struct VectorIndex {
    catalog: Catalog,
    dimension: usize,
    normalize: bool,
    ann: RwLock<AnnIndex>,
}

impl VectorIndex {
    pub fn new(catalog: Catalog, dimension: usize, normalize: bool, ann_cfg: AnnConfig) -> Self {
        Self {
            catalog,
            dimension,
            normalize,
            ann: RwLock::new(AnnIndex::new(dimension, ann_cfg)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn ann_read(&self) -> std::sync::RwLockReadGuard<'_, AnnIndex> {
        self.ann.read().unwrap_or_else(|p| p.into_inner())
    }

    fn ann_write(&self) -> std::sync::RwLockWriteGuard<'_, AnnIndex> {
        self.ann.write().unwrap_or_else(|p| p.into_inner())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Rebuild the ANN cache from the chunk catalog (startup path).
    /// Returns the number of cached vectors.
    pub fn rebuild_from_catalog(&self) -> Result<usize, SearchError> {
        let chunks = self.catalog.all_chunks()?;
        let mut ann = self.ann_write();
        *ann = AnnIndex::new(self.dimension, AnnConfig::default());
        for chunk in &chunks {
            self.check_vector(&chunk.vector)?;
            ann.insert(chunk.id.clone(), chunk.vector.clone())
                .map_err(|e| SearchError::Validation(e.to_string()))?;
        }
        ann.build();
        info!(vectors = chunks.len(), "vector_cache_rebuilt");
        Ok(chunks.len())
    }

    /// Fold one committed chunk rewrite into the cache: purged ids become
    /// tombstones, the new batch is inserted, and an overdue compaction
    /// runs inline.
    pub fn apply_chunk_write(
        &self,
        purged: &[String],
        chunks: &[ChunkRecord],
    ) -> Result<(), SearchError> {
        let mut ann = self.ann_write();
        for id in purged {
            ann.remove(id);
        }
        for chunk in chunks {
            self.check_vector(&chunk.vector)?;
            ann.insert(chunk.id.clone(), chunk.vector.clone())
                .map_err(|e| SearchError::Validation(e.to_string()))?;
        }
        if ann.needs_compaction() {
            debug!("vector_cache_compacting");
            ann.rebuild();
        }
        Ok(())
    }

    /// Evict chunks of a deleted source.
    pub fn evict(&self, chunk_ids: &[String]) {
        let mut ann = self.ann_write();
        for id in chunk_ids {
            ann.remove(id);
        }
    }

    /// kNN for one tenant. Results sorted ascending by distance, ties by
    /// `(source_file_id, ordinal)`.
    pub fn knn(
        &self,
        scope: &TenantScope,
        query: &[f32],
        top_k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ChunkHit>, SearchError> {
        self.check_vector(query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let query = if self.normalize {
            l2_normalize(query)
        } else {
            query.to_vec()
        };

        let candidates = self.catalog.chunks_for_tenant(
            scope,
            filter.categories.as_deref(),
            filter.source_file_ids.as_deref(),
        )?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let by_id: HashMap<&str, &ChunkRecord> =
            candidates.iter().map(|c| (c.id.as_str(), c)).collect();

        let ann = self.ann_read();
        let mut hits: Vec<ChunkHit> = if ann.uses_graph() {
            let allowed: HashSet<String> = candidates.iter().map(|c| c.id.clone()).collect();
            let ann_hits = ann
                .search(&query, top_k, Some(&allowed))
                .map_err(|e| SearchError::Validation(e.to_string()))?;
            ann_hits
                .into_iter()
                .filter_map(|hit| {
                    by_id.get(hit.id.as_str()).map(|chunk| ChunkHit {
                        chunk: (*chunk).clone(),
                        distance: hit.distance,
                    })
                })
                .collect()
        } else {
            candidates
                .iter()
                .map(|chunk| ChunkHit {
                    chunk: chunk.clone(),
                    distance: l2_distance(&query, &chunk.vector),
                })
                .collect()
        };

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.source_file_id.cmp(&b.chunk.source_file_id))
                .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use store::FileRecord;

    fn file_record(id: &str, tenant: &str, category: &str) -> FileRecord {
        FileRecord {
            id: id.into(),
            tenant: tenant.into(),
            original_name: format!("{id}.txt"),
            category: category.into(),
            mime: "text/plain".into(),
            size_bytes: 1,
            sha256: format!("{id}-sha"),
            path: format!("{category}/2024/01/01/{id}.txt"),
            created_at: Utc::now(),
            indexed: false,
            indexed_sha: None,
            thumbs: vec![],
            comment: None,
            orphaned: false,
            meta: serde_json::json!({}),
        }
    }

    fn chunk(id: &str, source: &str, tenant: &str, ordinal: u32, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.into(),
            source_file_id: source.into(),
            tenant: tenant.into(),
            ordinal,
            text: format!("chunk {id}"),
            vector,
            meta: serde_json::json!({}),
        }
    }

    fn scope(tenant: &str) -> TenantScope {
        TenantScope::for_tests(tenant)
    }

    struct Fixture {
        catalog: Catalog,
        index: VectorIndex,
    }

    fn fixture() -> Fixture {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert_tenant("t1", 1_000_000).unwrap();
        catalog.upsert_tenant("t2", 1_000_000).unwrap();
        let index = VectorIndex::new(catalog.clone(), 3, false, AnnConfig::default());
        Fixture { catalog, index }
    }

    fn seed(f: &Fixture) {
        f.catalog.commit_file(&file_record("f1", "t1", "documents")).unwrap();
        f.catalog.commit_file(&file_record("f2", "t1", "code")).unwrap();
        f.catalog.commit_file(&file_record("f3", "t2", "documents")).unwrap();
        let s1 = scope("t1");
        let s2 = scope("t2");
        let purged = f
            .catalog
            .replace_chunks(
                &s1,
                "f1",
                &[
                    chunk("c1", "f1", "t1", 0, vec![1.0, 0.0, 0.0]),
                    chunk("c2", "f1", "t1", 1, vec![0.9, 0.1, 0.0]),
                ],
                "sha-f1",
            )
            .unwrap();
        f.index
            .apply_chunk_write(
                &purged,
                &[
                    chunk("c1", "f1", "t1", 0, vec![1.0, 0.0, 0.0]),
                    chunk("c2", "f1", "t1", 1, vec![0.9, 0.1, 0.0]),
                ],
            )
            .unwrap();
        let purged = f
            .catalog
            .replace_chunks(&s1, "f2", &[chunk("c3", "f2", "t1", 0, vec![0.0, 1.0, 0.0])], "sha-f2")
            .unwrap();
        f.index
            .apply_chunk_write(&purged, &[chunk("c3", "f2", "t1", 0, vec![0.0, 1.0, 0.0])])
            .unwrap();
        let purged = f
            .catalog
            .replace_chunks(&s2, "f3", &[chunk("c4", "f3", "t2", 0, vec![1.0, 0.0, 0.0])], "sha-f3")
            .unwrap();
        f.index
            .apply_chunk_write(&purged, &[chunk("c4", "f3", "t2", 0, vec![1.0, 0.0, 0.0])])
            .unwrap();
    }

    #[test]
    fn knn_orders_by_distance() {
        let f = fixture();
        seed(&f);
        let hits = f
            .index
            .knn(&scope("t1"), &[1.0, 0.0, 0.0], 3, &SearchFilter::default())
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.id, "c1");
        assert!(hits[0].distance < hits[1].distance);
        assert_eq!(hits[1].chunk.id, "c2");
    }

    #[test]
    fn knn_is_tenant_isolated() {
        let f = fixture();
        seed(&f);
        let hits = f
            .index
            .knn(&scope("t2"), &[1.0, 0.0, 0.0], 10, &SearchFilter::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "c4");
    }

    #[test]
    fn category_filter_restricts_sources() {
        let f = fixture();
        seed(&f);
        let filter = SearchFilter {
            categories: Some(vec!["code".into()]),
            source_file_ids: None,
        };
        let hits = f
            .index
            .knn(&scope("t1"), &[1.0, 0.0, 0.0], 10, &filter)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source_file_id, "f2");
    }

    #[test]
    fn source_filter_restricts_sources() {
        let f = fixture();
        seed(&f);
        let filter = SearchFilter {
            categories: None,
            source_file_ids: Some(vec!["f1".into()]),
        };
        let hits = f
            .index
            .knn(&scope("t1"), &[0.0, 1.0, 0.0], 10, &filter)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.chunk.source_file_id == "f1"));
    }

    #[test]
    fn equal_distances_tie_break_on_source_and_ordinal() {
        let f = fixture();
        f.catalog.commit_file(&file_record("fa", "t1", "documents")).unwrap();
        f.catalog.commit_file(&file_record("fb", "t1", "documents")).unwrap();
        let s = scope("t1");
        let same = vec![1.0, 0.0, 0.0];
        f.catalog
            .replace_chunks(
                &s,
                "fb",
                &[
                    chunk("cb1", "fb", "t1", 1, same.clone()),
                    chunk("cb0", "fb", "t1", 0, same.clone()),
                ],
                "sha",
            )
            .unwrap();
        f.catalog
            .replace_chunks(&s, "fa", &[chunk("ca0", "fa", "t1", 0, same.clone())], "sha")
            .unwrap();

        let hits = f.index.knn(&s, &same, 10, &SearchFilter::default()).unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(order, vec!["ca0", "cb0", "cb1"]);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let f = fixture();
        let err = f
            .index
            .knn(&scope("t1"), &[1.0, 0.0], 3, &SearchFilter::default())
            .unwrap_err();
        assert!(matches!(err, SearchError::DimensionMismatch { .. }));
    }

    #[test]
    fn rebuild_from_catalog_restores_cache() {
        let f = fixture();
        seed(&f);
        let rebuilt = VectorIndex::new(f.catalog.clone(), 3, false, AnnConfig::default());
        assert_eq!(rebuilt.rebuild_from_catalog().unwrap(), 4);
        let hits = rebuilt
            .knn(&scope("t1"), &[1.0, 0.0, 0.0], 1, &SearchFilter::default())
            .unwrap();
        assert_eq!(hits[0].chunk.id, "c1");
    }

    #[test]
    fn evict_removes_deleted_sources_from_cache() {
        let f = fixture();
        seed(&f);
        let (_, purged) = f.catalog.delete_file(&scope("t1"), "f1").unwrap();
        f.index.evict(&purged);
        let hits = f
            .index
            .knn(&scope("t1"), &[1.0, 0.0, 0.0], 10, &SearchFilter::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "c3");
    }
}
