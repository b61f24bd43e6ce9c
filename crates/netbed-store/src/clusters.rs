use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use netbed_model::{validate_name, Cluster, ClusterName};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// CRUD operations for cluster records, one JSON file per cluster.
pub struct ClusterStore {
    layout: StoreLayout,
}

impl ClusterStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn write(&self, cluster: &Cluster) -> Result<(), StoreError> {
        let dir = self.layout.clusters_dir();
        let dest = dir.join(cluster.name.as_str());
        let content = serde_json::to_string_pretty(cluster)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    /// Create a new cluster. Fails if the name is taken.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        active: bool,
    ) -> Result<Cluster, StoreError> {
        validate_name(name)?;
        if self.exists(name) {
            return Err(StoreError::ClusterExists(name.to_owned()));
        }
        let now = chrono::Utc::now().to_rfc3339();
        let cluster = Cluster {
            name: ClusterName::new(name),
            description: description.to_owned(),
            active,
            created_at: now.clone(),
            updated_at: now,
        };
        self.write(&cluster)?;
        Ok(cluster)
    }

    pub fn get(&self, name: &str) -> Result<Cluster, StoreError> {
        let path = self.layout.clusters_dir().join(name);
        if !path.exists() {
            return Err(StoreError::ClusterNotFound(name.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.layout.clusters_dir().join(name).exists()
    }

    /// List all clusters, sorted by name. Corrupted entries are skipped with
    /// a warning rather than failing the whole listing.
    pub fn list(&self) -> Result<Vec<Cluster>, StoreError> {
        let dir = self.layout.clusters_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name();
                let name_str = name.to_str().unwrap_or("");
                if !name_str.starts_with('.') {
                    match self.get(name_str) {
                        Ok(cluster) => results.push(cluster),
                        Err(e) => {
                            tracing::warn!("skipping corrupted cluster entry '{name_str}': {e}");
                        }
                    }
                }
            }
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    /// All clusters with `active = true`.
    pub fn list_active(&self) -> Result<Vec<Cluster>, StoreError> {
        Ok(self.list()?.into_iter().filter(|c| c.active).collect())
    }

    pub fn set_active(&self, name: &str, active: bool) -> Result<(), StoreError> {
        let mut cluster = self.get(name)?;
        cluster.active = active;
        cluster.updated_at = chrono::Utc::now().to_rfc3339();
        self.write(&cluster)
    }

    pub fn update_description(&self, name: &str, description: &str) -> Result<(), StoreError> {
        let mut cluster = self.get(name)?;
        cluster.description = description.to_owned();
        cluster.updated_at = chrono::Utc::now().to_rfc3339();
        self.write(&cluster)
    }

    /// Remove the cluster record. Device records are removed separately by
    /// `DeviceStore::delete_cluster_devices` (cascade is the caller's job so
    /// both stores stay single-purpose).
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.layout.clusters_dir().join(name);
        if !path.exists() {
            return Err(StoreError::ClusterNotFound(name.to_owned()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}
