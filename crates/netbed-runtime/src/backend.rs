use crate::RuntimeError;
use serde::{Deserialize, Serialize};

/// Everything needed to create one device container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub env: Vec<(String, String)>,
    /// Network the container is attached to at creation time.
    pub network: String,
    /// Static address on that network.
    pub address: String,
}

/// One row of a container listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSummary {
    pub name: String,
    pub running: bool,
}

/// Inspection result for a single container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub running: bool,
    /// `(network, address)` pairs the container is connected to.
    pub attachments: Vec<(String, String)>,
}

impl ContainerInfo {
    /// Address the container holds on `network`, if attached.
    pub fn address_on(&self, network: &str) -> Option<&str> {
        self.attachments
            .iter()
            .find(|(n, _)| n == network)
            .map(|(_, a)| a.as_str())
    }
}

/// Captured result of a command run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    /// Combined stdout and stderr, in that order.
    pub output: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// List all containers (running or not) whose name starts with `prefix`.
    fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerSummary>, RuntimeError>;

    fn inspect_container(&self, name: &str) -> Result<ContainerInfo, RuntimeError>;

    fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;

    fn start_container(&self, name: &str) -> Result<(), RuntimeError>;

    fn stop_container(&self, name: &str) -> Result<(), RuntimeError>;

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;

    fn create_network(&self, name: &str, subnet: &str) -> Result<(), RuntimeError>;

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Attach `container` to `network` at a static `address`.
    fn connect(&self, network: &str, container: &str, address: &str) -> Result<(), RuntimeError>;

    fn disconnect(&self, network: &str, container: &str) -> Result<(), RuntimeError>;

    /// Run a command inside a running container, capturing exit code and
    /// combined output. A non-zero exit code is reported in the `ExecOutput`,
    /// not as an error; `Err` means the command could not be run at all.
    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, RuntimeError>;
}

pub fn select_runtime(name: &str) -> Result<Box<dyn ContainerRuntime>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerCli::new())),
        "mock" => Ok(Box::new(crate::mock::MockRuntime::new())),
        other => Err(RuntimeError::Unavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_runtimes() {
        assert!(select_runtime("docker").is_ok());
        assert!(select_runtime("mock").is_ok());
    }

    #[test]
    fn select_invalid_runtime_fails() {
        assert!(select_runtime("podmanx").is_err());
    }
}
