//! Stowage taxonomy layer.
//!
//! Everything that decides *where a binary artifact belongs* lives here:
//!
//! - **Taxonomy configuration** - a closed, ordered list of category tags
//!   loaded once at process start. Each tag carries its extensions, MIME
//!   prefix patterns, a thumbnailability flag, and a description. The
//!   `other` fallback tag is mandatory and enforced by [`TaxonomyConfig::validate`].
//! - **Classification** - [`TaxonomyConfig::classify`] maps
//!   `(filename, declared MIME, magic MIME)` to a category tag plus the
//!   signal that matched. Same inputs, same answer, every time.
//! - **Path synthesis** - [`synthesize_path`] produces the collision-free
//!   canonical relative path `category/YYYY/MM/DD/<tenant>_<ts>_<rand12>.<ext>`
//!   with a cryptographically random suffix.
//!
//! ## Example
//!
//! ```
//! use taxonomy::{TaxonomyConfig, MatchedBy};
//!
//! let taxonomy = TaxonomyConfig::builtin();
//! taxonomy.validate().unwrap();
//!
//! let hit = taxonomy.classify("photo.JPG", Some("image/jpeg"), None);
//! assert_eq!(hit.category, "photos");
//! assert_eq!(hit.matched_by, MatchedBy::Extension);
//! assert!(taxonomy.is_thumbable(&hit.category));
//! ```

mod classify;
mod config;
mod error;
mod path;

pub use crate::classify::{Classification, MatchedBy};
pub use crate::config::{CategorySpec, TaxonomyConfig, FALLBACK_CATEGORY};
pub use crate::error::TaxonomyError;
pub use crate::path::{extension_of, random_suffix, synthesize_path};
