//! Container runtime backends for netbed.
//!
//! This crate implements the execution layer: a pluggable `ContainerRuntime`
//! trait over containers, bridge networks and in-container command execution,
//! with a docker CLI backend for real hosts and an in-memory mock for tests.

pub mod backend;
pub mod docker;
pub mod mock;

pub use backend::{
    select_runtime, ContainerInfo, ContainerRuntime, ContainerSpec, ContainerSummary, ExecOutput,
};
pub use docker::DockerCli;
pub use mock::MockRuntime;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime '{0}' is not available on this system")]
    Unavailable(String),
    #[error("no such resource: {0}")]
    NotFound(String),
    #[error("resource already exists: {0}")]
    AlreadyExists(String),
    #[error("container '{container}' is already connected to network '{network}'")]
    AlreadyConnected { container: String, network: String },
    #[error("runtime command failed: {0}")]
    CommandFailed(String),
}
