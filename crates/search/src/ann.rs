//! Approximate nearest-neighbor cache over chunk vectors.
//!
//! HNSW (via `hnsw_rs`) with a linear-scan fallback below a configurable
//! corpus size; the graph cannot delete nodes, so removals become
//! tombstones that searches skip and [`AnnIndex::rebuild`] compacts away.
//! Everything here is a cache over the chunk catalog - losing it costs a
//! rebuild, never data.

use std::collections::{HashMap, HashSet};

use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};

/// HNSW construction and search parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
    /// Neighbors per node (higher = better recall, slower build).
    pub m: usize,
    /// Candidate-list size during construction.
    pub ef_construction: usize,
    /// Candidate-list size during search.
    pub ef_search: usize,
    /// Corpus size below which linear scan is used even when built.
    pub min_vectors_for_ann: usize,
    /// Tombstone fraction that triggers a compaction on the next rebuild
    /// opportunity.
    pub max_tombstone_ratio: f32,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            min_vectors_for_ann: 1000,
            max_tombstone_ratio: 0.3,
        }
    }
}

impl AnnConfig {
    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    fn should_use_ann(&self, live_vectors: usize) -> bool {
        live_vectors >= self.min_vectors_for_ann
    }
}

/// One neighbor: the chunk id and its L2 distance.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnHit {
    pub id: String,
    pub distance: f32,
}

/// Euclidean distance; the index-wide metric.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// In-memory ANN cache keyed by chunk id.
pub struct AnnIndex {
    config: AnnConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistL2>>,
    id_to_slot: HashMap<String, usize>,
    slot_to_id: Vec<String>,
    vectors: Vec<Vec<f32>>,
    tombstones: HashSet<usize>,
    built: bool,
}

impl AnnIndex {
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            id_to_slot: HashMap::new(),
            slot_to_id: Vec::new(),
            vectors: Vec::new(),
            tombstones: HashSet::new(),
            built: false,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Live (non-tombstoned) vector count.
    pub fn len(&self) -> usize {
        self.vectors.len() - self.tombstones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a vector. Replacement tombstones the old slot.
    pub fn insert(&mut self, id: String, vector: Vec<f32>) -> Result<(), AnnCacheError> {
        if vector.len() != self.dimension {
            return Err(AnnCacheError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        if let Some(&old) = self.id_to_slot.get(&id) {
            self.tombstones.insert(old);
        }
        let slot = self.vectors.len();
        self.vectors.push(vector);
        self.slot_to_id.push(id.clone());
        self.id_to_slot.insert(id, slot);
        self.built = false;
        Ok(())
    }

    /// Tombstone an id; unknown ids are ignored.
    pub fn remove(&mut self, id: &str) {
        if let Some(slot) = self.id_to_slot.remove(id) {
            self.tombstones.insert(slot);
        }
    }

    fn tombstone_ratio(&self) -> f32 {
        if self.vectors.is_empty() {
            return 0.0;
        }
        self.tombstones.len() as f32 / self.vectors.len() as f32
    }

    /// Compact tombstones away and rebuild the graph when the corpus is
    /// big enough to benefit.
    pub fn rebuild(&mut self) {
        if !self.tombstones.is_empty() {
            let mut vectors = Vec::with_capacity(self.len());
            let mut slot_to_id = Vec::with_capacity(self.len());
            let mut id_to_slot = HashMap::with_capacity(self.len());
            for (slot, vector) in self.vectors.drain(..).enumerate() {
                if self.tombstones.contains(&slot) {
                    continue;
                }
                let id = std::mem::take(&mut self.slot_to_id[slot]);
                id_to_slot.insert(id.clone(), vectors.len());
                slot_to_id.push(id);
                vectors.push(vector);
            }
            self.vectors = vectors;
            self.slot_to_id = slot_to_id;
            self.id_to_slot = id_to_slot;
            self.tombstones.clear();
        }
        self.build();
    }

    /// Build the HNSW graph. Small corpora stay on linear scan.
    pub fn build(&mut self) {
        self.built = true;
        self.hnsw = None;
        let nb_elem = self.vectors.len();
        if nb_elem < self.config.min_vectors_for_ann.max(10) {
            return;
        }

        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);
        let hnsw = Hnsw::<f32, DistL2>::new(
            self.config.m,
            nb_elem,
            nb_layer,
            self.config.ef_construction,
            DistL2 {},
        );
        let data: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(slot, _)| !self.tombstones.contains(slot))
            .map(|(slot, vector)| (vector, slot))
            .collect();
        hnsw.parallel_insert(&data);
        self.hnsw = Some(hnsw);
    }

    /// Whether searches would currently take the graph path.
    pub fn uses_graph(&self) -> bool {
        self.built && self.hnsw.is_some() && self.config.should_use_ann(self.len())
    }

    /// kNN over the cache, optionally restricted to `allowed` ids.
    /// Results come back sorted ascending by distance.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        allowed: Option<&HashSet<String>>,
    ) -> Result<Vec<AnnHit>, AnnCacheError> {
        if query.len() != self.dimension {
            return Err(AnnCacheError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let allowed_slot = |slot: usize| -> bool {
            if self.tombstones.contains(&slot) {
                return false;
            }
            match allowed {
                Some(set) => set.contains(&self.slot_to_id[slot]),
                None => true,
            }
        };

        if self.uses_graph() {
            if let Some(hnsw) = &self.hnsw {
                // Oversample so the filter has something left to keep.
                let oversample = (k * 4).max(self.config.ef_search);
                let neighbours = hnsw.search(query, oversample, self.config.ef_search);
                let mut hits: Vec<AnnHit> = neighbours
                    .into_iter()
                    .filter(|n| allowed_slot(n.get_origin_id()))
                    .map(|n| AnnHit {
                        id: self.slot_to_id[n.get_origin_id()].clone(),
                        distance: n.distance,
                    })
                    .collect();
                hits.truncate(k);
                if hits.len() == k {
                    return Ok(hits);
                }
                // Underfilled after filtering: fall through to the scan.
            }
        }

        let mut scored: Vec<AnnHit> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(slot, _)| allowed_slot(*slot))
            .map(|(slot, vector)| AnnHit {
                id: self.slot_to_id[slot].clone(),
                distance: l2_distance(query, vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Whether a compaction is overdue.
    pub fn needs_compaction(&self) -> bool {
        self.tombstone_ratio() > self.config.max_tombstone_ratio
    }
}

/// Error type for the ANN cache.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnnCacheError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> AnnIndex {
        AnnIndex::new(3, AnnConfig::default())
    }

    #[test]
    fn linear_search_orders_by_distance() {
        let mut idx = index();
        idx.insert("far".into(), vec![0.0, 1.0, 0.0]).unwrap();
        idx.insert("near".into(), vec![0.9, 0.0, 0.0]).unwrap();
        idx.insert("exact".into(), vec![1.0, 0.0, 0.0]).unwrap();

        let hits = idx.search(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].id, "exact");
        assert!(hits[0].distance < 1e-6);
        assert_eq!(hits[1].id, "near");
    }

    #[test]
    fn dimension_mismatch_is_hard_error() {
        let mut idx = index();
        assert!(idx.insert("a".into(), vec![1.0]).is_err());
        idx.insert("a".into(), vec![1.0, 0.0, 0.0]).unwrap();
        assert!(idx.search(&[1.0], 1, None).is_err());
    }

    #[test]
    fn removal_tombstones_and_rebuild_compacts() {
        let mut idx = index();
        idx.insert("a".into(), vec![1.0, 0.0, 0.0]).unwrap();
        idx.insert("b".into(), vec![0.0, 1.0, 0.0]).unwrap();
        idx.remove("a");
        assert_eq!(idx.len(), 1);

        let hits = idx.search(&[1.0, 0.0, 0.0], 5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");

        idx.rebuild();
        assert_eq!(idx.len(), 1);
        let hits = idx.search(&[0.0, 1.0, 0.0], 5, None).unwrap();
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn allowed_filter_restricts_results() {
        let mut idx = index();
        idx.insert("a".into(), vec![1.0, 0.0, 0.0]).unwrap();
        idx.insert("b".into(), vec![0.99, 0.0, 0.0]).unwrap();

        let allowed: HashSet<String> = ["b".to_string()].into();
        let hits = idx.search(&[1.0, 0.0, 0.0], 2, Some(&allowed)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn replacement_keeps_latest_vector() {
        let mut idx = index();
        idx.insert("a".into(), vec![1.0, 0.0, 0.0]).unwrap();
        idx.insert("a".into(), vec![0.0, 1.0, 0.0]).unwrap();
        assert_eq!(idx.len(), 1);
        let hits = idx.search(&[0.0, 1.0, 0.0], 1, None).unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance < 1e-6);
    }

    #[test]
    fn graph_path_engages_above_threshold() {
        let cfg = AnnConfig::default().with_min_vectors_for_ann(10);
        let mut idx = AnnIndex::new(3, cfg);
        for i in 0..50 {
            let angle = i as f32 * 0.1;
            idx.insert(format!("c{i}"), vec![angle.cos(), angle.sin(), 0.0])
                .unwrap();
        }
        idx.build();
        assert!(idx.uses_graph());

        let hits = idx.search(&[1.0, 0.0, 0.0], 3, None).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "c0");
    }

    #[test]
    fn empty_index_returns_nothing() {
        let idx = index();
        assert!(idx.search(&[0.0, 0.0, 0.0], 5, None).unwrap().is_empty());
    }
}
