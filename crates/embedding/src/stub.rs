//! Deterministic offline gateway.

use fxhash::hash64;

use crate::error::EmbeddingError;
use crate::normalize::l2_normalize_in_place;
use crate::{check_dimension, EmbeddingGateway};

/// Deterministic [`EmbeddingGateway`] used by tests and degraded
/// deployments. Vectors are sinusoids seeded from a hash of the text, so
/// equal texts embed identically and nearby runs reproduce bit-for-bit
/// with minimal CPU cost.
pub struct StubGateway {
    dimension: usize,
    normalize: bool,
}

impl StubGateway {
    pub fn new(dimension: usize, normalize: bool) -> Self {
        Self {
            dimension,
            normalize,
        }
    }

    fn make_vector(&self, text: &str) -> Vec<f32> {
        let h = hash64(text.as_bytes());
        let mut v = vec![0f32; self.dimension];
        for (idx, value) in v.iter_mut().enumerate() {
            let seed = h.rotate_left((idx % 64) as u32) as f32;
            *value = (seed * 0.0001).sin();
        }
        if self.normalize {
            l2_normalize_in_place(&mut v);
        }
        v
    }
}

impl EmbeddingGateway for StubGateway {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let v = self.make_vector(text);
        check_dimension(self.dimension, &v)?;
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn health(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_is_deterministic() {
        let g = StubGateway::new(64, true);
        assert_eq!(g.embed("same text").unwrap(), g.embed("same text").unwrap());
    }

    #[test]
    fn different_text_different_vector() {
        let g = StubGateway::new(64, false);
        assert_ne!(g.embed("hello").unwrap(), g.embed("world").unwrap());
    }

    #[test]
    fn respects_dimension() {
        let g = StubGateway::new(96, false);
        assert_eq!(g.embed("abc").unwrap().len(), 96);
        assert_eq!(g.dimension(), 96);
    }

    #[test]
    fn normalized_vectors_are_unit_length() {
        let g = StubGateway::new(128, true);
        let v = g.embed("normalize me").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn batch_matches_single_calls() {
        let g = StubGateway::new(32, true);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = g.embed_batch(&texts).unwrap();
        assert_eq!(batch[0], g.embed("a").unwrap());
        assert_eq!(batch[1], g.embed("b").unwrap());
    }

    #[test]
    fn health_is_always_ok() {
        assert!(StubGateway::new(8, false).health().is_ok());
    }
}
