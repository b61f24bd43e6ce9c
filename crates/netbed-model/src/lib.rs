//! Resource model for the netbed testbed engine.
//!
//! This crate defines the typed records the engine reconciles (clusters and
//! devices with their immutable network identity) plus the deterministic
//! identity planner (subnet, network/container names, addresses), the
//! redirect-device naming rule, the device status state machine values, and
//! the `netbed.toml` configuration file.

pub mod config;
pub mod identity;
pub mod records;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, Config, RuntimeConfig, ServerConfig, StoreConfig,
    SyncConfig,
};
pub use identity::{ifb_for_interface, next_free_octet, subnet_octet, validate_name, NetworkPlan};
pub use records::{Cluster, Device, DeviceStatus};
pub use types::{ClusterName, ContainerName, DeviceName, NetworkName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
    #[error("subnet space exhausted: all 254 /24 blocks are in use")]
    SubnetsExhausted,
    #[error("malformed subnet '{0}': expected 10.N.0.0/24")]
    MalformedSubnet(String),
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
