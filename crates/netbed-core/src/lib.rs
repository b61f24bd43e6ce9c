//! Reconciliation engine for the netbed testbed.
//!
//! This crate ties the record store and the container runtime together into
//! the `Reconciler`, the central API for previewing and executing syncs of
//! desired devices against actually running containers. The `TopologyDriver`
//! builds and tears down one device's infrastructure (network, router
//! attachment, interface discovery, traffic-control plumbing, container);
//! `SyncLock` serializes concurrent syncs over one store.

pub mod concurrency;
pub mod discovery;
pub mod lifecycle;
pub mod reconcile;
pub mod shaping;
pub mod topology;

pub use concurrency::SyncLock;
pub use discovery::{discover_interface, parse_interface_listing, DiscoveryPolicy};
pub use lifecycle::validate_transition;
pub use reconcile::{Reconciler, SyncPreview, SyncResult};
pub use shaping::{apply_commands, init_commands, teardown_commands, ShapeCmd};
pub use topology::TopologyDriver;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("model error: {0}")]
    Model(#[from] netbed_model::ModelError),
    #[error("store error: {0}")]
    Store(#[from] netbed_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] netbed_runtime::RuntimeError),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("no interface carrying {address} appeared after {attempts} attempts")]
    DiscoveryTimeout { address: String, attempts: u32 },
    #[error("cannot derive redirect device from interface '{0}'")]
    RedirectNaming(String),
    #[error("shaping command '{command}' failed: {output}")]
    ShapingFailed { command: String, output: String },
    #[error("destroy failed: {0}")]
    DestroyFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
