//! Thumbnail derivative generation.
//!
//! Three derivatives per thumbable artifact at fixed target boxes,
//! aspect-ratio preserving, re-encoded to JPEG (opaque sources) or PNG
//! (sources with an alpha channel). Derivatives live in a flat
//! `thumbnails/` tree keyed by the canonical file stem, which is already
//! unique per artifact.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::debug;

use store::ThumbDescriptor;

use crate::error::MediaError;

/// `(label, target box)` for the three derivatives.
pub const THUMB_SIZES: [(&str, u32); 3] = [("small", 150), ("medium", 300), ("large", 600)];

fn stem_of(canonical_rel: &str) -> String {
    let file = canonical_rel.rsplit('/').next().unwrap_or(canonical_rel);
    match file.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => file.to_string(),
    }
}

/// Paths the derivatives of `canonical_rel` would occupy (both encodings,
/// for deletion sweeps).
pub fn derivative_paths(root: &Path, canonical_rel: &str) -> Vec<PathBuf> {
    let stem = stem_of(canonical_rel);
    let dir = root.join("thumbnails");
    THUMB_SIZES
        .iter()
        .flat_map(|(label, _)| {
            [
                dir.join(format!("{stem}_{label}.jpg")),
                dir.join(format!("{stem}_{label}.png")),
            ]
        })
        .collect()
}

/// Decode guessing the format from content, not the extension; a
/// mis-extensioned upload still sits under its declared name.
pub(crate) fn open_by_content(path: &Path) -> Result<DynamicImage, MediaError> {
    image::ImageReader::open(path)
        .map_err(|e| MediaError::Image(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| MediaError::Image(e.to_string()))?
        .decode()
        .map_err(|e| MediaError::Image(e.to_string()))
}

/// Generate the three derivatives for an already-canonical artifact.
/// Returns the descriptors in size order.
pub fn generate(root: &Path, canonical_rel: &str) -> Result<Vec<ThumbDescriptor>, MediaError> {
    let source = root.join(canonical_rel);
    let img = open_by_content(&source)?;
    let has_alpha = img.color().has_alpha();
    let ext = if has_alpha { "png" } else { "jpg" };
    let stem = stem_of(canonical_rel);

    let thumb_dir = root.join("thumbnails");
    fs::create_dir_all(&thumb_dir)?;

    let mut descriptors = Vec::with_capacity(THUMB_SIZES.len());
    for (label, size) in THUMB_SIZES {
        // Sources already inside the target box are carried at original
        // size; derivatives never upscale.
        let thumb = if img.width() <= size && img.height() <= size {
            img.clone()
        } else {
            img.thumbnail(size, size)
        };
        let rel = format!("thumbnails/{stem}_{label}.{ext}");
        let target = root.join(&rel);
        if has_alpha {
            thumb
                .save(&target)
                .map_err(|e| MediaError::Image(e.to_string()))?;
        } else {
            // JPEG has no alpha channel; flatten to RGB8 before encoding.
            DynamicImage::ImageRgb8(thumb.to_rgb8())
                .save(&target)
                .map_err(|e| MediaError::Image(e.to_string()))?;
        }
        debug!(path = %rel, width = thumb.width(), height = thumb.height(), "thumbnail_written");
        descriptors.push(ThumbDescriptor {
            label: label.to_string(),
            path: rel,
            width: thumb.width(),
            height: thumb.height(),
        });
    }
    Ok(descriptors)
}

/// Remove any derivatives of `canonical_rel`; missing files are fine.
pub fn remove(root: &Path, canonical_rel: &str) {
    for path in derivative_paths(root, canonical_rel) {
        let _ = fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn write_opaque_png(root: &Path, rel: &str, width: u32, height: u32) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = RgbImage::from_pixel(width, height, Rgb([200u8, 40, 40]));
        img.save(&path).unwrap();
    }

    fn write_transparent_png(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = RgbaImage::from_pixel(64, 64, Rgba([0u8, 0, 0, 10]));
        img.save(&path).unwrap();
    }

    #[test]
    fn three_derivatives_with_aspect_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "photos/2024/01/01/t1_x_a.png";
        write_opaque_png(dir.path(), rel, 800, 400);

        let thumbs = generate(dir.path(), rel).unwrap();
        assert_eq!(thumbs.len(), 3);
        assert_eq!(thumbs[0].label, "small");
        // 800x400 into a 150 box keeps the 2:1 ratio.
        assert_eq!((thumbs[0].width, thumbs[0].height), (150, 75));
        assert_eq!((thumbs[2].width, thumbs[2].height), (600, 300));
        for thumb in &thumbs {
            assert!(thumb.path.ends_with(".jpg"));
            assert!(dir.path().join(&thumb.path).is_file());
        }
    }

    #[test]
    fn transparent_sources_reencode_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "photos/2024/01/01/t1_x_b.png";
        write_transparent_png(dir.path(), rel);

        let thumbs = generate(dir.path(), rel).unwrap();
        for thumb in &thumbs {
            assert!(thumb.path.ends_with(".png"));
        }
    }

    #[test]
    fn small_sources_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "photos/2024/01/01/t1_x_c.png";
        write_opaque_png(dir.path(), rel, 20, 20);

        let thumbs = generate(dir.path(), rel).unwrap();
        // image::thumbnail never upscales.
        assert!(thumbs.iter().all(|t| t.width <= 20 && t.height <= 20));
    }

    #[test]
    fn undecodable_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "photos/2024/01/01/t1_x_d.png";
        fs::create_dir_all(dir.path().join("photos/2024/01/01")).unwrap();
        fs::write(dir.path().join(rel), b"not an image").unwrap();
        assert!(matches!(generate(dir.path(), rel), Err(MediaError::Image(_))));
    }

    #[test]
    fn remove_clears_derivatives() {
        let dir = tempfile::tempdir().unwrap();
        let rel = "photos/2024/01/01/t1_x_e.png";
        write_opaque_png(dir.path(), rel, 100, 100);
        let thumbs = generate(dir.path(), rel).unwrap();
        remove(dir.path(), rel);
        for thumb in thumbs {
            assert!(!dir.path().join(thumb.path).exists());
        }
    }
}
