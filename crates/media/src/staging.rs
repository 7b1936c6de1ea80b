//! Tenant-scoped staging files with scoped cleanup.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::MediaError;

/// A partially received upload under `staging/<tenant>/<uuid>.part`.
///
/// The staging file is removed on drop unless it was promoted to its
/// canonical path, so every exit path - error, cancellation, panic -
/// leaves no partial bytes behind.
pub struct StagedUpload {
    path: PathBuf,
    file: Option<File>,
    promoted: bool,
}

impl StagedUpload {
    pub fn create(root: &Path, tenant_id: &str) -> Result<Self, MediaError> {
        let dir = root.join("staging").join(tenant_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.part", Uuid::new_v4()));
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            promoted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), MediaError> {
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(bytes)?;
                Ok(())
            }
            None => Err(MediaError::Validation("staging file already closed".into())),
        }
    }

    /// Flush and close the handle; required before rename on some
    /// platforms.
    pub fn finish_writing(&mut self) -> Result<(), MediaError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Atomically rename into the canonical location. On success the
    /// staging file no longer exists and drop becomes a no-op.
    pub fn promote(&mut self, target: &Path) -> Result<(), MediaError> {
        self.finish_writing()?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&self.path, target)?;
        self.promoted = true;
        Ok(())
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        self.file.take();
        if !self.promoted {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_file_lives_under_tenant_dir() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::create(dir.path(), "t1").unwrap();
        assert!(staged.path().starts_with(dir.path().join("staging").join("t1")));
        assert!(staged.path().extension().is_some_and(|e| e == "part"));
        assert!(staged.path().exists());
    }

    #[test]
    fn dropped_staging_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut staged = StagedUpload::create(dir.path(), "t1").unwrap();
            staged.write_all(b"partial").unwrap();
            path = staged.path().to_path_buf();
        }
        assert!(!path.exists());
    }

    #[test]
    fn promoted_file_survives() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("photos/2024/01/01/file.bin");
        let staged_path;
        {
            let mut staged = StagedUpload::create(dir.path(), "t1").unwrap();
            staged.write_all(b"content").unwrap();
            staged_path = staged.path().to_path_buf();
            staged.promote(&target).unwrap();
        }
        assert!(!staged_path.exists());
        assert_eq!(fs::read(&target).unwrap(), b"content");
    }
}
