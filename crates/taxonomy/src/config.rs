//! Declarative taxonomy configuration.
//!
//! The taxonomy is a closed set of category tags with a total order: the
//! position of a tag in [`TaxonomyConfig::categories`] is its match
//! priority, so more specific tags (`videos_mp4`) must be listed before the
//! general ones (`videos_other`). The configuration is loaded once at
//! process start and is immutable afterwards; a reload requires a restart.
//!
//! # File format
//!
//! ```toml
//! [[categories]]
//! name = "photos"
//! extensions = [".jpg", ".jpeg", ".png"]
//! mime_patterns = ["image/"]
//! thumbable = true
//! description = "Raster images"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TaxonomyError;

/// The designated fallback tag. [`TaxonomyConfig::validate`] rejects any
/// taxonomy that does not carry it.
pub const FALLBACK_CATEGORY: &str = "other";

/// A single category tag and its matching rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategorySpec {
    /// The tag itself; doubles as the top-level on-disk folder name, so it
    /// is restricted to `[a-z0-9_]`.
    pub name: String,
    /// Ordered list of file extensions (with leading dot, lowercase).
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Ordered list of MIME prefixes; a pattern matches when it is a prefix
    /// of the effective MIME (`"image/"` matches every image subtype).
    #[serde(default)]
    pub mime_patterns: Vec<String>,
    /// Whether artifacts of this category get thumbnail derivatives.
    #[serde(default)]
    pub thumbable: bool,
    /// Human description, surfaced in listings only.
    #[serde(default)]
    pub description: String,
}

/// The full ordered taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxonomyConfig {
    pub categories: Vec<CategorySpec>,
}

impl TaxonomyConfig {
    /// Load a taxonomy from a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TaxonomyError> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|source| TaxonomyError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse a taxonomy from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, TaxonomyError> {
        let cfg: Self = toml::from_str(raw)?;
        Ok(cfg)
    }

    /// The default taxonomy shipped with the service. Ordering matters:
    /// specific tags come before general ones.
    pub fn builtin() -> Self {
        fn cat(
            name: &str,
            extensions: &[&str],
            mime_patterns: &[&str],
            thumbable: bool,
            description: &str,
        ) -> CategorySpec {
            CategorySpec {
                name: name.into(),
                extensions: extensions.iter().map(|s| s.to_string()).collect(),
                mime_patterns: mime_patterns.iter().map(|s| s.to_string()).collect(),
                thumbable,
                description: description.into(),
            }
        }

        Self {
            categories: vec![
                cat(
                    "photos",
                    &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".tiff"],
                    &["image/"],
                    true,
                    "Raster images",
                ),
                cat(
                    "videos_mp4",
                    &[".mp4", ".m4v"],
                    &["video/mp4"],
                    false,
                    "MPEG-4 video containers",
                ),
                cat(
                    "videos_other",
                    &[".mov", ".avi", ".mkv", ".webm"],
                    &["video/"],
                    false,
                    "Video in non-MP4 containers",
                ),
                cat(
                    "audio",
                    &[".mp3", ".wav", ".flac", ".ogg", ".m4a"],
                    &["audio/"],
                    false,
                    "Audio recordings",
                ),
                cat(
                    "documents",
                    &[".pdf", ".doc", ".docx", ".txt", ".md", ".rtf", ".odt"],
                    &[
                        "application/pdf",
                        "text/plain",
                        "text/markdown",
                        "application/msword",
                    ],
                    false,
                    "Text documents",
                ),
                cat(
                    "spreadsheets",
                    &[".csv", ".xls", ".xlsx", ".ods"],
                    &["text/csv", "application/vnd.ms-excel"],
                    false,
                    "Tabular data sheets",
                ),
                cat(
                    "archives",
                    &[".zip", ".tar", ".gz", ".7z", ".rar"],
                    &["application/zip", "application/x-tar", "application/gzip"],
                    false,
                    "Compressed archives",
                ),
                cat(
                    "code",
                    &[
                        ".rs", ".py", ".js", ".ts", ".go", ".java", ".c", ".cpp", ".h", ".html",
                        ".css", ".sh",
                    ],
                    &["text/html", "text/css", "application/javascript"],
                    false,
                    "Source code",
                ),
                cat(
                    "data",
                    &[".json", ".xml", ".yaml", ".yml", ".toml"],
                    &["application/json", "application/xml", "text/xml"],
                    false,
                    "Structured data files",
                ),
                cat(FALLBACK_CATEGORY, &[], &[], false, "Everything else"),
            ],
        }
    }

    /// Validates internal consistency: the fallback tag must exist, tags
    /// must be unique and filesystem-safe.
    pub fn validate(&self) -> Result<(), TaxonomyError> {
        let mut seen = std::collections::HashSet::new();
        for cat in &self.categories {
            if cat.name.is_empty()
                || !cat
                    .name
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
            {
                return Err(TaxonomyError::InvalidTag(cat.name.clone()));
            }
            if !seen.insert(cat.name.as_str()) {
                return Err(TaxonomyError::DuplicateCategory(cat.name.clone()));
            }
        }
        if !seen.contains(FALLBACK_CATEGORY) {
            return Err(TaxonomyError::MissingFallback(FALLBACK_CATEGORY));
        }
        Ok(())
    }

    /// Look up a category by tag.
    pub fn category(&self, tag: &str) -> Option<&CategorySpec> {
        self.categories.iter().find(|c| c.name == tag)
    }

    /// Whether a tag admits thumbnail derivatives. Unknown tags never do.
    pub fn is_thumbable(&self, tag: &str) -> bool {
        self.category(tag).map(|c| c.thumbable).unwrap_or(false)
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_is_valid() {
        TaxonomyConfig::builtin().validate().expect("builtin valid");
    }

    #[test]
    fn builtin_orders_specific_before_general() {
        let cfg = TaxonomyConfig::builtin();
        let mp4 = cfg
            .categories
            .iter()
            .position(|c| c.name == "videos_mp4")
            .unwrap();
        let other = cfg
            .categories
            .iter()
            .position(|c| c.name == "videos_other")
            .unwrap();
        assert!(mp4 < other);
    }

    #[test]
    fn missing_fallback_rejected() {
        let mut cfg = TaxonomyConfig::builtin();
        cfg.categories.retain(|c| c.name != FALLBACK_CATEGORY);
        assert!(matches!(
            cfg.validate(),
            Err(TaxonomyError::MissingFallback(_))
        ));
    }

    #[test]
    fn duplicate_tag_rejected() {
        let mut cfg = TaxonomyConfig::builtin();
        let dup = cfg.categories[0].clone();
        cfg.categories.push(dup);
        assert!(matches!(
            cfg.validate(),
            Err(TaxonomyError::DuplicateCategory(_))
        ));
    }

    #[test]
    fn invalid_tag_rejected() {
        let mut cfg = TaxonomyConfig::builtin();
        cfg.categories[0].name = "Bad Tag".into();
        assert!(matches!(cfg.validate(), Err(TaxonomyError::InvalidTag(_))));
    }

    #[test]
    fn toml_roundtrip() {
        let raw = r#"
            [[categories]]
            name = "photos"
            extensions = [".jpg"]
            mime_patterns = ["image/"]
            thumbable = true
            description = "pictures"

            [[categories]]
            name = "other"
        "#;
        let cfg = TaxonomyConfig::from_toml(raw).expect("parses");
        cfg.validate().expect("valid");
        assert_eq!(cfg.categories.len(), 2);
        assert!(cfg.is_thumbable("photos"));
        assert!(!cfg.is_thumbable("other"));
        assert!(!cfg.is_thumbable("missing"));
    }
}
