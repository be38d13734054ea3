//! Persistent volume hand-off
//!
//! The working data directory lives inside the image; the database files
//! must survive container replacement, so after a fresh deployment they are
//! moved onto the persistent volume and linked back.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Working data directory paired with its persistent location
#[derive(Debug, Clone)]
pub struct Volume {
    data_dir: PathBuf,
    persist_dir: PathBuf,
}

impl Volume {
    pub fn new(data_dir: PathBuf, persist_dir: PathBuf) -> Self {
        Self { data_dir, persist_dir }
    }

    /// Where the data directory is kept on the volume
    pub fn persisted_data_dir(&self) -> PathBuf {
        self.persist_dir.join("data")
    }

    /// No database files on the volume yet
    pub fn is_fresh(&self) -> bool {
        let db_dir = self.persisted_data_dir().join("db");
        match std::fs::read_dir(&db_dir) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    /// Move freshly initialised data onto the volume and link it back
    pub fn prepare_data_to_persist(&self) -> Result<()> {
        let target = self.persisted_data_dir();
        if is_symlink(&self.data_dir) {
            return Ok(());
        }

        tracing::info!("==> Persisting {:?} into {:?}", self.data_dir, target);
        std::fs::create_dir_all(&self.persist_dir)?;
        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        if std::fs::rename(&self.data_dir, &target).is_err() {
            // Volume on another filesystem
            copy_dir(&self.data_dir, &target)?;
            std::fs::remove_dir_all(&self.data_dir)?;
        }
        std::os::unix::fs::symlink(&target, &self.data_dir)?;
        Ok(())
    }

    /// Point the working data directory at the persisted copy
    pub fn restore_persisted_data(&self) -> Result<()> {
        let target = self.persisted_data_dir();
        tracing::info!("==> Restoring persisted data from {:?}", target);

        if is_symlink(&self.data_dir) {
            std::fs::remove_file(&self.data_dir)?;
        } else if self.data_dir.exists() {
            std::fs::remove_dir_all(&self.data_dir)?;
        }
        if let Some(parent) = self.data_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(&target, &self.data_dir)?;
        Ok(())
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fresh_until_db_files_persisted() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("app").join("data");
        let volume = Volume::new(data.clone(), dir.path().join("persist"));
        assert!(volume.is_fresh());

        std::fs::create_dir_all(data.join("db")).unwrap();
        std::fs::write(data.join("db").join("WiredTiger"), b"wt").unwrap();
        volume.prepare_data_to_persist().unwrap();

        assert!(!volume.is_fresh());
        assert!(is_symlink(&data));
        assert_eq!(std::fs::read(data.join("db").join("WiredTiger")).unwrap(), b"wt");
    }

    #[test]
    fn test_restore_replaces_image_data() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        let persist = dir.path().join("persist");
        std::fs::create_dir_all(persist.join("data").join("db")).unwrap();
        std::fs::write(persist.join("data").join("db").join("collection-0.wt"), b"c").unwrap();
        std::fs::create_dir_all(&data).unwrap();

        let volume = Volume::new(data.clone(), persist);
        volume.restore_persisted_data().unwrap();

        assert!(is_symlink(&data));
        assert!(data.join("db").join("collection-0.wt").exists());
    }

    #[test]
    fn test_empty_db_dir_is_fresh() {
        let dir = tempdir().unwrap();
        let persist = dir.path().join("persist");
        std::fs::create_dir_all(persist.join("data").join("db")).unwrap();

        let volume = Volume::new(dir.path().join("data"), persist);
        assert!(volume.is_fresh());
    }
}
