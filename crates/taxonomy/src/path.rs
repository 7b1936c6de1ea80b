//! Canonical path synthesis.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

/// Lowercased extension of `name`, without the dot. Hidden files
/// (`.gitignore`) and dotless names yield `None`.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// 12 hex chars from the OS cryptographic RNG.
pub fn random_suffix() -> String {
    let mut bytes = [0u8; 6];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Synthesize the canonical relative path for an artifact:
/// `<tag>/<YYYY>/<MM>/<DD>/<tenant>_<YYYYMMDD_HHMMSS>_<rand12>.<ext>`.
///
/// The caller owns collision handling: an existence check at commit time
/// that finds a prior file re-synthesizes with a fresh suffix, bounded to
/// three attempts.
pub fn synthesize_path(
    tag: &str,
    tenant_id: &str,
    original_name: &str,
    now: DateTime<Utc>,
) -> String {
    let ext = extension_of(original_name)
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!(
        "{tag}/{date}/{tenant_id}_{stamp}_{rand}{ext}",
        date = now.format("%Y/%m/%d"),
        stamp = now.format("%Y%m%d_%H%M%S"),
        rand = random_suffix(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 14, 30, 5).unwrap()
    }

    #[test]
    fn extension_extraction() {
        assert_eq!(extension_of("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn path_shape() {
        let path = synthesize_path("photos", "tenant-a", "photo.JPG", fixed_now());
        let parts: Vec<&str> = path.split('/').collect();
        assert_eq!(parts[..4], ["photos", "2024", "03", "07"]);

        let file = parts[4];
        assert!(file.starts_with("tenant-a_20240307_143005_"));
        assert!(file.ends_with(".jpg"));
        let rand = file
            .trim_start_matches("tenant-a_20240307_143005_")
            .trim_end_matches(".jpg");
        assert_eq!(rand.len(), 12);
        assert!(rand.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn extensionless_names_get_no_dot() {
        let path = synthesize_path("other", "t", "blob", fixed_now());
        let file = path.rsplit('/').next().unwrap();
        assert!(!file.contains('.'));
    }

    #[test]
    fn suffixes_differ_across_calls() {
        let a = synthesize_path("photos", "t", "a.png", fixed_now());
        let b = synthesize_path("photos", "t", "a.png", fixed_now());
        assert_ne!(a, b);
    }
}
