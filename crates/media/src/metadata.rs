//! Media metadata extraction.
//!
//! Best-effort throughout: a file that refuses to decode simply yields an
//! emptier metadata object. Nothing here can fail an ingest.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Value};
use tracing::debug;

/// Extract metadata for a stored artifact. Raster fields and EXIF only
/// apply to thumbable categories; the universal fields (size, digest,
/// MIME) live on the catalog row itself.
pub fn extract(path: &Path, thumbable: bool) -> Value {
    let mut meta = serde_json::Map::new();
    if !thumbable {
        return Value::Object(meta);
    }

    match crate::thumbs::open_by_content(path) {
        Ok(img) => {
            meta.insert("width".into(), json!(img.width()));
            meta.insert("height".into(), json!(img.height()));
            meta.insert("color_mode".into(), json!(format!("{:?}", img.color())));
            meta.insert("has_alpha".into(), json!(img.color().has_alpha()));
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "raster_metadata_unavailable");
        }
    }

    let exif = extract_exif(path);
    if !exif.is_empty() {
        meta.insert("exif".into(), json!(exif));
    }

    Value::Object(meta)
}

fn extract_exif(path: &Path) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    match rexif::parse_file(path) {
        Ok(exif) => {
            for entry in exif.entries {
                tags.insert(entry.tag.to_string(), entry.value_more_readable.to_string());
            }
        }
        Err(err) => {
            // Most formats simply carry no EXIF; that is not a problem.
            debug!(path = %path.display(), error = %err, "exif_unavailable");
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn raster_fields_for_decodable_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        RgbaImage::from_pixel(32, 16, Rgba([1u8, 2, 3, 128]))
            .save(&path)
            .unwrap();

        let meta = extract(&path, true);
        assert_eq!(meta["width"], json!(32));
        assert_eq!(meta["height"], json!(16));
        assert_eq!(meta["has_alpha"], json!(true));
    }

    #[test]
    fn non_thumbable_yields_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"plain text").unwrap();
        assert_eq!(extract(&path, false), json!({}));
    }

    #[test]
    fn undecodable_thumbable_degrades_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let meta = extract(&path, true);
        assert!(meta.get("width").is_none());
    }
}
