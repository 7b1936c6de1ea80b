//! Service configuration.
//!
//! One struct describing every stage, loaded once at process start (TOML
//! file or code-constructed), validated before any traffic. Reloading
//! requires a restart; nothing here mutates after [`crate::Service::open`].
//!
//! ## Example TOML
//!
//! ```toml
//! root_dir = "/var/lib/stowage"
//! normalize_vectors = true
//!
//! [embedding]
//! api_url = "http://embedder:8750/v1/embed"
//! dimension = 768
//!
//! [chunker]
//! target_chars = 500
//! overlap_chars = 50
//!
//! [[taxonomy.categories]]
//! name = "photos"
//! extensions = [".jpg", ".png"]
//! mime_patterns = ["image/"]
//! thumbable = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use chunker::ChunkerConfig;
use embedding::EmbeddingConfig;
use search::{AnnConfig, TokenizerConfig};
use taxonomy::TaxonomyConfig;

use crate::error::ServiceError;

/// Full service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Storage root; canonical files, thumbnails, staging, and the
    /// databases all live under it.
    pub root_dir: PathBuf,
    /// Catalog database path; defaults to `<root_dir>/catalog.db`.
    pub catalog_path: Option<PathBuf>,
    /// Document store path; defaults to `<root_dir>/documents.redb`.
    pub document_store_path: Option<PathBuf>,
    /// The classification taxonomy (inline, or see `taxonomy_path`).
    pub taxonomy: TaxonomyConfig,
    /// Optional external taxonomy file; overrides the inline taxonomy.
    pub taxonomy_path: Option<PathBuf>,
    pub chunker: ChunkerConfig,
    pub embedding: EmbeddingConfig,
    /// Whether stored and query vectors are L2-normalized (fixed at
    /// startup; makes L2 ranking cosine-equivalent).
    pub normalize_vectors: bool,
    pub ann: AnnConfig,
    pub tokenizer: TokenizerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./stowage-data"),
            catalog_path: None,
            document_store_path: None,
            taxonomy: TaxonomyConfig::builtin(),
            taxonomy_path: None,
            chunker: ChunkerConfig::default(),
            embedding: EmbeddingConfig::default(),
            normalize_vectors: true,
            ann: AnnConfig::default(),
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn with_root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = root.into();
        self
    }

    pub fn with_embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: TaxonomyConfig) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    /// Load from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    /// Parse from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ServiceError> {
        toml::from_str(raw).map_err(|e| ServiceError::Validation(format!("config: {e}")))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.root_dir.join("catalog.db"))
    }

    pub fn document_store_path(&self) -> PathBuf {
        self.document_store_path
            .clone()
            .unwrap_or_else(|| self.root_dir.join("documents.redb"))
    }

    /// Resolve the effective taxonomy (external file wins) and validate
    /// it.
    pub fn load_taxonomy(&self) -> Result<TaxonomyConfig, ServiceError> {
        let taxonomy = match &self.taxonomy_path {
            Some(path) => TaxonomyConfig::from_path(path)?,
            None => self.taxonomy.clone(),
        };
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    /// Startup validation across every stage config.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(ServiceError::Validation("root_dir is empty".into()));
        }
        self.chunker.validate()?;
        self.embedding
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        self.load_taxonomy()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ServiceConfig::default().validate().expect("default valid");
    }

    #[test]
    fn toml_roundtrip_with_partial_file() {
        let cfg = ServiceConfig::from_toml(
            r#"
            root_dir = "/tmp/stowage-test"
            normalize_vectors = false

            [embedding]
            dimension = 384

            [chunker]
            target_chars = 200
            overlap_chars = 20
            "#,
        )
        .unwrap();
        assert_eq!(cfg.root_dir, PathBuf::from("/tmp/stowage-test"));
        assert!(!cfg.normalize_vectors);
        assert_eq!(cfg.embedding.dimension, 384);
        assert_eq!(cfg.chunker.target_chars, 200);
        // Untouched sections keep their defaults.
        assert!(cfg.taxonomy.category("other").is_some());
        cfg.validate().unwrap();
    }

    #[test]
    fn invalid_chunker_rejected_at_startup() {
        let mut cfg = ServiceConfig::default();
        cfg.chunker.overlap_chars = cfg.chunker.target_chars;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn taxonomy_without_fallback_rejected() {
        let mut cfg = ServiceConfig::default();
        cfg.taxonomy.categories.retain(|c| c.name != "other");
        assert!(cfg.validate().is_err());
    }
}
