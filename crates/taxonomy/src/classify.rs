//! Multi-signal type classification.
//!
//! The classifier is pure: it consults the ordered taxonomy with the
//! filename extension first, then the effective MIME (magic-derived when
//! the magic answer is non-generic, declared otherwise), and falls back to
//! the `other` tag. No taxonomy rule ever inspects content here; magic
//! sniffing happens upstream and arrives as an already-detected MIME.

use serde::{Deserialize, Serialize};

use crate::config::{TaxonomyConfig, FALLBACK_CATEGORY};
use crate::path::extension_of;

/// MIME values the magic sniffer reports when it learned nothing useful.
const GENERIC_MIME: &str = "application/octet-stream";

/// Which signal decided the category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Extension,
    Mime,
    Magic,
    Default,
}

impl std::fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchedBy::Extension => "extension",
            MatchedBy::Mime => "mime",
            MatchedBy::Magic => "magic",
            MatchedBy::Default => "default",
        };
        f.write_str(s)
    }
}

/// Outcome of a classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    /// The winning category tag.
    pub category: String,
    /// The signal that produced the match.
    pub matched_by: MatchedBy,
    /// The MIME the decision was made against (informational).
    pub effective_mime: String,
}

impl TaxonomyConfig {
    /// Classify a file by `(filename, declared MIME, magic MIME)`.
    ///
    /// Resolution order:
    /// 1. lowercased filename extension against each tag's extension list,
    ///    in taxonomy order;
    /// 2. effective MIME (magic when non-generic, else declared, else
    ///    `application/octet-stream`) against each tag's MIME prefixes, in
    ///    taxonomy order;
    /// 3. the `other` fallback.
    pub fn classify(
        &self,
        filename: &str,
        declared_mime: Option<&str>,
        magic_mime: Option<&str>,
    ) -> Classification {
        let magic = magic_mime
            .map(str::trim)
            .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case(GENERIC_MIME));
        let declared = declared_mime.map(str::trim).filter(|m| !m.is_empty());
        let (effective_mime, mime_signal) = match (magic, declared) {
            (Some(m), _) => (m.to_ascii_lowercase(), MatchedBy::Magic),
            (None, Some(d)) => (d.to_ascii_lowercase(), MatchedBy::Mime),
            (None, None) => (GENERIC_MIME.to_string(), MatchedBy::Mime),
        };

        if let Some(ext) = extension_of(filename) {
            let dotted = format!(".{ext}");
            for cat in &self.categories {
                if cat.extensions.iter().any(|e| *e == dotted) {
                    return Classification {
                        category: cat.name.clone(),
                        matched_by: MatchedBy::Extension,
                        effective_mime,
                    };
                }
            }
        }

        for cat in &self.categories {
            if cat
                .mime_patterns
                .iter()
                .any(|p| effective_mime.starts_with(p.as_str()))
            {
                return Classification {
                    category: cat.name.clone(),
                    matched_by: mime_signal,
                    effective_mime,
                };
            }
        }

        Classification {
            category: FALLBACK_CATEGORY.to_string(),
            matched_by: MatchedBy::Default,
            effective_mime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> TaxonomyConfig {
        TaxonomyConfig::builtin()
    }

    #[test]
    fn uppercase_extension_wins() {
        let hit = taxonomy().classify("photo.JPG", Some("image/jpeg"), None);
        assert_eq!(hit.category, "photos");
        assert_eq!(hit.matched_by, MatchedBy::Extension);
    }

    #[test]
    fn extension_beats_contradicting_mime() {
        // The pipeline trusts only the tag for derivative work, so a
        // mis-declared MIME must not flip the category.
        let hit = taxonomy().classify("notes.txt", Some("image/png"), None);
        assert_eq!(hit.category, "documents");
        assert_eq!(hit.matched_by, MatchedBy::Extension);
    }

    #[test]
    fn magic_preferred_over_declared() {
        let hit = taxonomy().classify("upload.bin", Some("text/plain"), Some("image/png"));
        assert_eq!(hit.category, "photos");
        assert_eq!(hit.matched_by, MatchedBy::Magic);
        assert_eq!(hit.effective_mime, "image/png");
    }

    #[test]
    fn generic_magic_falls_back_to_declared() {
        let hit = taxonomy().classify(
            "upload.bin",
            Some("audio/mpeg"),
            Some("application/octet-stream"),
        );
        assert_eq!(hit.category, "audio");
        assert_eq!(hit.matched_by, MatchedBy::Mime);
    }

    #[test]
    fn mime_prefix_matches_subtypes() {
        let hit = taxonomy().classify("clip", Some("video/x-matroska"), None);
        assert_eq!(hit.category, "videos_other");
        assert_eq!(hit.matched_by, MatchedBy::Mime);
    }

    #[test]
    fn specific_tag_wins_on_order() {
        let hit = taxonomy().classify("movie", Some("video/mp4"), None);
        assert_eq!(hit.category, "videos_mp4");
    }

    #[test]
    fn unknown_everything_is_other_default() {
        let hit = taxonomy().classify("mystery.xyz", None, None);
        assert_eq!(hit.category, "other");
        assert_eq!(hit.matched_by, MatchedBy::Default);
        assert_eq!(hit.effective_mime, "application/octet-stream");
    }

    #[test]
    fn classification_is_deterministic() {
        let t = taxonomy();
        let a = t.classify("photo.JPG", Some("image/jpeg"), Some("image/jpeg"));
        let b = t.classify("photo.JPG", Some("image/jpeg"), Some("image/jpeg"));
        assert_eq!(a, b);
    }
}
