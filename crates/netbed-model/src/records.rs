//! Cluster and device records.
//!
//! A `Cluster` groups devices and gates whether they are desired at all;
//! a `Device` carries the immutable network identity assigned at creation
//! plus the runtime-discovered router-side interface fields.

use crate::types::{ClusterName, ContainerName, DeviceName, NetworkName};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a device's infrastructure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Stopped => write!(f, "stopped"),
            DeviceStatus::Starting => write!(f, "starting"),
            DeviceStatus::Running => write!(f, "running"),
            DeviceStatus::Stopping => write!(f, "stopping"),
            DeviceStatus::Error => write!(f, "error"),
        }
    }
}

/// A named, activatable group of devices.
///
/// Multiple clusters may be active at the same time; the desired set is the
/// union of devices across all active clusters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub name: ClusterName,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One emulated endpoint: a container on its own bridge network behind the
/// shared router.
///
/// The network identity fields (`subnet` through `router_address`) are
/// assigned once at creation and never change. `interface` and `ifb_device`
/// are discovered against the live router and are present exactly while the
/// device is running (transiently while starting).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub cluster: ClusterName,
    pub name: DeviceName,

    pub subnet: String,
    pub network_name: NetworkName,
    pub container_name: ContainerName,
    pub address: String,
    pub router_address: String,

    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub ifb_device: Option<String>,

    pub status: DeviceStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

impl Device {
    /// Whether the router-side interface fields have been discovered.
    pub fn has_interface(&self) -> bool {
        self.interface.is_some() && self.ifb_device.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&DeviceStatus::Starting).unwrap();
        assert_eq!(json, "\"starting\"");
        let back: DeviceStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, DeviceStatus::Error);
    }

    #[test]
    fn device_without_interface_fields_deserializes() {
        let json = r#"{
            "cluster": "lab",
            "name": "pc1",
            "subnet": "10.1.0.0/24",
            "network_name": "nb_net_lab_pc1",
            "container_name": "nb_lab_pc1",
            "address": "10.1.0.10",
            "router_address": "10.1.0.254",
            "status": "stopped",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }"#;
        let device: Device = serde_json::from_str(json).unwrap();
        assert!(!device.has_interface());
        assert_eq!(device.status, DeviceStatus::Stopped);
    }
}
