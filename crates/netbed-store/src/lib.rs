//! File-backed record store for netbed.
//!
//! This crate provides the persistence layer: `ClusterStore` and
//! `DeviceStore` keep one JSON document per record under a `StoreLayout`
//! directory tree, written atomically (temp file + rename + dir fsync).
//! Device status changes go through semantic transition helpers so the
//! interface-field invariant is enforced at the storage boundary.

pub mod clusters;
pub mod devices;
pub mod layout;

pub use clusters::ClusterStore;
pub use devices::DeviceStore;
pub use layout::StoreLayout;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("cluster '{0}' already exists")]
    ClusterExists(String),
    #[error("device '{device}' already exists in cluster '{cluster}'")]
    DeviceExists { cluster: String, device: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("model error: {0}")]
    Model(#[from] netbed_model::ModelError),
}
