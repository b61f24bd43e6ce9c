//! Per-device infrastructure build-up and teardown.

use crate::discovery::{discover_interface, DiscoveryPolicy};
use crate::shaping::{apply_commands, init_commands, teardown_commands};
use crate::CoreError;
use netbed_model::{ifb_for_interface, Device};
use netbed_runtime::{ContainerRuntime, ContainerSpec, RuntimeError};

/// Creates and destroys the concrete resources of one device: its bridge
/// network, the router attachment, the shaping state on the discovered
/// router interface, and the device container.
///
/// `create` is idempotent per step so a device whose earlier creation
/// half-finished converges on retry; `destroy` is tolerant per step so it
/// cleans up partial creations regardless of which steps completed.
pub struct TopologyDriver<'a> {
    runtime: &'a dyn ContainerRuntime,
    router: &'a str,
    image: &'a str,
    policy: DiscoveryPolicy,
}

impl<'a> TopologyDriver<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        router: &'a str,
        image: &'a str,
        policy: DiscoveryPolicy,
    ) -> Self {
        Self {
            runtime,
            router,
            image,
            policy,
        }
    }

    /// Build the device's infrastructure, returning the discovered router
    /// interface and its paired IFB device name.
    pub fn create(&self, device: &Device) -> Result<(String, String), CoreError> {
        match self
            .runtime
            .create_network(&device.network_name, &device.subnet)
        {
            Ok(()) => {}
            Err(RuntimeError::AlreadyExists(_)) => {
                tracing::debug!("network {} already exists, reusing", device.network_name);
            }
            Err(e) => return Err(e.into()),
        }

        match self
            .runtime
            .connect(&device.network_name, self.router, &device.router_address)
        {
            Ok(()) | Err(RuntimeError::AlreadyConnected { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let interface =
            discover_interface(self.runtime, self.router, &device.router_address, self.policy)?;
        let ifb = ifb_for_interface(&interface)
            .ok_or_else(|| CoreError::RedirectNaming(interface.clone()))?;

        apply_commands(self.runtime, self.router, &init_commands(&interface, &ifb))?;

        self.ensure_container(device)?;

        tracing::info!(
            "created device {} (interface {interface}, redirect {ifb})",
            device.container_name
        );
        Ok((interface, ifb))
    }

    /// Create the device container, or converge an existing one: start it if
    /// stopped and re-attach it to its network at the planned address.
    fn ensure_container(&self, device: &Device) -> Result<(), CoreError> {
        match self.runtime.inspect_container(&device.container_name) {
            Ok(info) => {
                if !info.running {
                    self.runtime.start_container(&device.container_name)?;
                }
                match info.address_on(&device.network_name) {
                    Some(address) if address == device.address => {}
                    Some(address) => {
                        // Attached, but default allocation picked a different
                        // address. Reconnect at the planned one.
                        tracing::debug!(
                            "{} holds {address} on {}, reattaching at {}",
                            device.container_name,
                            device.network_name,
                            device.address
                        );
                        self.runtime
                            .disconnect(&device.network_name, &device.container_name)?;
                        self.connect_at_planned_address(device)?;
                    }
                    None => self.connect_at_planned_address(device)?,
                }
                Ok(())
            }
            Err(RuntimeError::NotFound(_)) => {
                let spec = ContainerSpec {
                    name: device.container_name.to_string(),
                    image: self.image.to_owned(),
                    hostname: device.name.to_string(),
                    env: vec![("ROUTER_IP".to_owned(), device.router_address.clone())],
                    network: device.network_name.to_string(),
                    address: device.address.clone(),
                };
                self.runtime.create_container(&spec)?;
                self.runtime.start_container(&device.container_name)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn connect_at_planned_address(&self, device: &Device) -> Result<(), CoreError> {
        match self.runtime.connect(
            &device.network_name,
            &device.container_name,
            &device.address,
        ) {
            Ok(()) | Err(RuntimeError::AlreadyConnected { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Tear down the device's infrastructure in reverse creation order.
    ///
    /// Each step is failure-isolated: absence of a target is never an error,
    /// real failures are accumulated and reported together so one broken
    /// step does not leave the later resources behind.
    pub fn destroy(&self, device: &Device) -> Result<(), CoreError> {
        let mut errors: Vec<String> = Vec::new();

        match self.runtime.stop_container(&device.container_name) {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => errors.push(format!("container stop failed: {e}")),
        }
        match self.runtime.remove_container(&device.container_name) {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => errors.push(format!("container removal failed: {e}")),
        }

        if let Some(interface) = &device.interface {
            let commands = teardown_commands(interface, device.ifb_device.as_deref());
            if let Err(e) = apply_commands(self.runtime, self.router, &commands) {
                errors.push(format!("shaping teardown failed: {e}"));
            }
        }

        match self.runtime.disconnect(&device.network_name, self.router) {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => errors.push(format!("router disconnect failed: {e}")),
        }

        match self.runtime.remove_network(&device.network_name) {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => errors.push(format!("network removal failed: {e}")),
        }

        if errors.is_empty() {
            tracing::info!("destroyed device {}", device.container_name);
            Ok(())
        } else {
            Err(CoreError::DestroyFailed(errors.join("; ")))
        }
    }
}
