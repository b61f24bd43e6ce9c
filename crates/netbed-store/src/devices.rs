use crate::layout::StoreLayout;
use crate::{fsync_dir, StoreError};
use netbed_model::{
    next_free_octet, subnet_octet, validate_name, ClusterName, Device, DeviceName, DeviceStatus,
    NetworkPlan,
};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// CRUD and status transitions for device records, one JSON file per device
/// keyed by container name.
///
/// Status changes go through the `mark_*` helpers rather than a generic
/// update, so that the interface fields are populated exactly while a device
/// is starting or running and cleared on every path back to stopped or error.
pub struct DeviceStore {
    layout: StoreLayout,
}

impl DeviceStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    fn write(&self, device: &Device) -> Result<(), StoreError> {
        let dir = self.layout.devices_dir();
        let dest = dir.join(device.container_name.as_str());
        let content = serde_json::to_string_pretty(device)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    /// Create a device record in `cluster`, allocating the first free /24
    /// block and deriving the full network identity from `prefix`, cluster
    /// and device name. The new record starts out `stopped`.
    pub fn create(&self, prefix: &str, cluster: &str, name: &str) -> Result<Device, StoreError> {
        validate_name(name)?;
        let plan = {
            let used = self.used_octets()?;
            let octet = next_free_octet(&used)?;
            NetworkPlan::derive(prefix, cluster, name, octet)
        };
        if self.exists(&plan.container_name) {
            return Err(StoreError::DeviceExists {
                cluster: cluster.to_owned(),
                device: name.to_owned(),
            });
        }
        let now = chrono::Utc::now().to_rfc3339();
        let device = Device {
            cluster: ClusterName::new(cluster),
            name: DeviceName::new(name),
            subnet: plan.subnet,
            network_name: plan.network_name,
            container_name: plan.container_name,
            address: plan.address,
            router_address: plan.router_address,
            interface: None,
            ifb_device: None,
            status: DeviceStatus::Stopped,
            error_message: None,
            last_synced_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.write(&device)?;
        Ok(device)
    }

    pub fn get(&self, container_name: &str) -> Result<Device, StoreError> {
        let path = self.layout.devices_dir().join(container_name);
        if !path.exists() {
            return Err(StoreError::DeviceNotFound(container_name.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(&self, container_name: &str) -> bool {
        self.layout.devices_dir().join(container_name).exists()
    }

    /// List all devices, sorted by container name. Corrupted entries are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<Device>, StoreError> {
        let dir = self.layout.devices_dir();
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
                        Ok(device) => results.push(device),
                        Err(e) => {
                            tracing::warn!("skipping corrupted device entry '{name_str}': {e}");
                        }
                    }
                }
            }
        }
        results.sort_by(|a, b| a.container_name.cmp(&b.container_name));
        Ok(results)
    }

    /// Devices belonging to one cluster.
    pub fn list_cluster(&self, cluster: &str) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|d| d.cluster == cluster)
            .collect())
    }

    /// Devices belonging to any of the given clusters.
    pub fn list_in_clusters(&self, clusters: &[ClusterName]) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|d| clusters.contains(&d.cluster))
            .collect())
    }

    /// Second octets of every allocated subnet, for free-block search.
    pub fn used_octets(&self) -> Result<Vec<u8>, StoreError> {
        let mut used = Vec::new();
        for device in self.list()? {
            used.push(subnet_octet(&device.subnet)?);
        }
        Ok(used)
    }

    pub fn mark_starting(&self, container_name: &str) -> Result<Device, StoreError> {
        let mut device = self.get(container_name)?;
        device.status = DeviceStatus::Starting;
        device.error_message = None;
        device.updated_at = chrono::Utc::now().to_rfc3339();
        self.write(&device)?;
        Ok(device)
    }

    /// Record a successful start: the device is running with the given
    /// router-side interface pair, and counts as synced now.
    pub fn mark_running(
        &self,
        container_name: &str,
        interface: &str,
        ifb_device: &str,
    ) -> Result<Device, StoreError> {
        let mut device = self.get(container_name)?;
        let now = chrono::Utc::now().to_rfc3339();
        device.status = DeviceStatus::Running;
        device.interface = Some(interface.to_owned());
        device.ifb_device = Some(ifb_device.to_owned());
        device.error_message = None;
        device.last_synced_at = Some(now.clone());
        device.updated_at = now;
        self.write(&device)?;
        Ok(device)
    }

    pub fn mark_stopping(&self, container_name: &str) -> Result<Device, StoreError> {
        let mut device = self.get(container_name)?;
        device.status = DeviceStatus::Stopping;
        device.updated_at = chrono::Utc::now().to_rfc3339();
        self.write(&device)?;
        Ok(device)
    }

    /// Record a completed teardown. Clears the interface fields: a stopped
    /// device has no router-side plumbing.
    pub fn mark_stopped(&self, container_name: &str) -> Result<Device, StoreError> {
        let mut device = self.get(container_name)?;
        let now = chrono::Utc::now().to_rfc3339();
        device.status = DeviceStatus::Stopped;
        device.interface = None;
        device.ifb_device = None;
        device.error_message = None;
        device.last_synced_at = Some(now.clone());
        device.updated_at = now;
        self.write(&device)?;
        Ok(device)
    }

    /// Record a failed operation. Clears the interface fields since the
    /// device's plumbing can no longer be trusted; the next sync retries it.
    pub fn mark_error(&self, container_name: &str, message: &str) -> Result<Device, StoreError> {
        let mut device = self.get(container_name)?;
        device.status = DeviceStatus::Error;
        device.interface = None;
        device.ifb_device = None;
        device.error_message = Some(message.to_owned());
        device.updated_at = chrono::Utc::now().to_rfc3339();
        self.write(&device)?;
        Ok(device)
    }

    pub fn delete(&self, container_name: &str) -> Result<(), StoreError> {
        let path = self.layout.devices_dir().join(container_name);
        if !path.exists() {
            return Err(StoreError::DeviceNotFound(container_name.to_owned()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Remove every device record belonging to `cluster`. Returns the
    /// container names that were removed.
    pub fn delete_cluster_devices(&self, cluster: &str) -> Result<Vec<String>, StoreError> {
        let mut removed = Vec::new();
        for device in self.list_cluster(cluster)? {
            self.delete(&device.container_name)?;
            removed.push(device.container_name.into_inner());
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, DeviceStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, DeviceStore::new(layout))
    }

    #[test]
    fn create_allocates_sequential_subnets() {
        let (_dir, store) = test_store();
        let a = store.create("nb_", "lab", "pc1").unwrap();
        let b = store.create("nb_", "lab", "pc2").unwrap();
        assert_eq!(a.subnet, "10.1.0.0/24");
        assert_eq!(b.subnet, "10.2.0.0/24");
        assert_eq!(a.container_name, "nb_lab_pc1");
        assert_eq!(a.address, "10.1.0.10");
        assert_eq!(a.router_address, "10.1.0.254");
        assert_eq!(a.status, DeviceStatus::Stopped);
    }

    #[test]
    fn freed_subnet_is_reused() {
        let (_dir, store) = test_store();
        store.create("nb_", "lab", "pc1").unwrap();
        store.create("nb_", "lab", "pc2").unwrap();
        store.delete("nb_lab_pc1").unwrap();
        let c = store.create("nb_", "lab", "pc3").unwrap();
        assert_eq!(c.subnet, "10.1.0.0/24");
    }

    #[test]
    fn duplicate_device_fails() {
        let (_dir, store) = test_store();
        store.create("nb_", "lab", "pc1").unwrap();
        assert!(matches!(
            store.create("nb_", "lab", "pc1"),
            Err(StoreError::DeviceExists { .. })
        ));
    }

    #[test]
    fn running_sets_and_stopped_clears_interface_fields() {
        let (_dir, store) = test_store();
        store.create("nb_", "lab", "pc1").unwrap();

        store.mark_starting("nb_lab_pc1").unwrap();
        let running = store.mark_running("nb_lab_pc1", "eth3", "ifb3").unwrap();
        assert!(running.has_interface());
        assert_eq!(running.interface.as_deref(), Some("eth3"));
        assert!(running.last_synced_at.is_some());

        store.mark_stopping("nb_lab_pc1").unwrap();
        let stopped = store.mark_stopped("nb_lab_pc1").unwrap();
        assert_eq!(stopped.status, DeviceStatus::Stopped);
        assert!(!stopped.has_interface());
    }

    #[test]
    fn error_clears_interface_fields_and_records_message() {
        let (_dir, store) = test_store();
        store.create("nb_", "lab", "pc1").unwrap();
        store.mark_running("nb_lab_pc1", "eth3", "ifb3").unwrap();

        let failed = store.mark_error("nb_lab_pc1", "router unreachable").unwrap();
        assert_eq!(failed.status, DeviceStatus::Error);
        assert!(!failed.has_interface());
        assert_eq!(failed.error_message.as_deref(), Some("router unreachable"));

        // recovery path clears the message again
        let retried = store.mark_starting("nb_lab_pc1").unwrap();
        assert!(retried.error_message.is_none());
    }

    #[test]
    fn list_in_clusters_filters() {
        let (_dir, store) = test_store();
        store.create("nb_", "red", "pc1").unwrap();
        store.create("nb_", "blue", "pc1").unwrap();
        store.create("nb_", "green", "pc1").unwrap();

        let wanted = vec![ClusterName::new("red"), ClusterName::new("green")];
        let devices = store.list_in_clusters(&wanted).unwrap();
        let names: Vec<&str> = devices.iter().map(|d| d.container_name.as_str()).collect();
        assert_eq!(names, ["nb_green_pc1", "nb_red_pc1"]);
    }

    #[test]
    fn delete_cluster_devices_cascades() {
        let (_dir, store) = test_store();
        store.create("nb_", "lab", "pc1").unwrap();
        store.create("nb_", "lab", "pc2").unwrap();
        store.create("nb_", "other", "pc1").unwrap();

        let removed = store.delete_cluster_devices("lab").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.exists("nb_other_pc1"));
    }
}
