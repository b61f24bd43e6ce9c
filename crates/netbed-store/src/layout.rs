use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout for the netbed record store.
///
/// One JSON file per record: clusters under `clusters/`, devices under
/// `devices/` keyed by container name. Subdirectories are created on
/// [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn clusters_dir(&self) -> PathBuf {
        self.root.join("clusters")
    }

    #[inline]
    pub fn devices_dir(&self) -> PathBuf {
        self.root.join("devices")
    }

    /// Lock file serializing concurrent sync invocations.
    #[inline]
    pub fn sync_lock_file(&self) -> PathBuf {
        self.root.join(".sync-lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.clusters_dir())?;
        fs::create_dir_all(self.devices_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        assert!(layout.clusters_dir().is_dir());
        assert!(layout.devices_dir().is_dir());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.initialize().unwrap();
    }
}
