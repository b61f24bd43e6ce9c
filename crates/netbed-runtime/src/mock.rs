use crate::backend::{ContainerInfo, ContainerRuntime, ContainerSpec, ContainerSummary, ExecOutput};
use crate::RuntimeError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockContainer {
    running: bool,
    // network name -> address
    attachments: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct MockWorld {
    // network name -> subnet
    networks: BTreeMap<String, String>,
    containers: BTreeMap<String, MockContainer>,
    // router-side veth peers, in attachment order
    router_ifaces: Vec<(String, String)>,
    next_iface: u32,
    exec_log: Vec<(String, Vec<String>)>,
    // address -> number of upcoming listings in which it stays invisible
    hidden_addresses: HashMap<String, u32>,
    fail_create: HashSet<String>,
    // (command substring, failure output)
    fail_exec: Option<(String, String)>,
}

/// In-memory runtime with a pre-existing router container.
///
/// Models the parts of a container host the engine touches: named bridge
/// networks, containers with static attachments, and router-side interface
/// allocation (each attachment of the router gets the next `eth{n}` name,
/// visible in the synthesized `ip -4 addr show` output). Fault injection
/// hooks cover create failures, delayed interface visibility and failing
/// in-container commands.
pub struct MockRuntime {
    router: String,
    world: Mutex<MockWorld>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::with_router("router")
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_router(router: impl Into<String>) -> Self {
        let router = router.into();
        let mut world = MockWorld {
            next_iface: 1,
            ..MockWorld::default()
        };
        world.containers.insert(
            router.clone(),
            MockContainer {
                running: true,
                attachments: BTreeMap::new(),
            },
        );
        Self {
            router,
            world: Mutex::new(world),
        }
    }

    fn world(&self) -> MutexGuard<'_, MockWorld> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `address` invisible in the next `times` interface listings.
    pub fn hide_address(&self, address: &str, times: u32) {
        self.world()
            .hidden_addresses
            .insert(address.to_owned(), times);
    }

    /// Make the next `create_container` for `name` fail.
    pub fn fail_create_container(&self, name: &str) {
        self.world().fail_create.insert(name.to_owned());
    }

    /// Make any exec whose joined command contains `needle` exit non-zero
    /// with the given output.
    pub fn fail_exec_containing(&self, needle: &str, output: &str) {
        self.world().fail_exec = Some((needle.to_owned(), output.to_owned()));
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.world().containers.contains_key(name)
    }

    pub fn container_running(&self, name: &str) -> bool {
        self.world()
            .containers
            .get(name)
            .is_some_and(|c| c.running)
    }

    pub fn network_exists(&self, name: &str) -> bool {
        self.world().networks.contains_key(name)
    }

    /// Router interface allocated for `address`, if any.
    pub fn router_interface_for(&self, address: &str) -> Option<String> {
        self.world()
            .router_ifaces
            .iter()
            .find(|(_, a)| a == address)
            .map(|(iface, _)| iface.clone())
    }

    /// Commands run so far, as (container, argv) pairs.
    pub fn exec_history(&self) -> Vec<(String, Vec<String>)> {
        self.world().exec_log.clone()
    }

    fn synthesize_addr_listing(world: &mut MockWorld) -> String {
        let mut out = String::from(
            "1: lo: <LOOPBACK,UP,LOWER_UP>\n    inet 127.0.0.1/8 scope host lo\n",
        );
        let mut visible = Vec::new();
        for (iface, addr) in &world.router_ifaces {
            match world.hidden_addresses.get_mut(addr) {
                Some(remaining) if *remaining > 0 => *remaining -= 1,
                _ => visible.push((iface.clone(), addr.clone())),
            }
        }
        for (iface, addr) in visible {
            out.push_str(&format!(
                "    inet {addr}/24 brd 10.255.255.255 scope global {iface}\n"
            ));
        }
        out
    }
}

impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let world = self.world();
        Ok(world
            .containers
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, c)| ContainerSummary {
                name: name.clone(),
                running: c.running,
            })
            .collect())
    }

    fn inspect_container(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        let world = self.world();
        let container = world
            .containers
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))?;
        Ok(ContainerInfo {
            name: name.to_owned(),
            running: container.running,
            attachments: container
                .attachments
                .iter()
                .map(|(n, a)| (n.clone(), a.clone()))
                .collect(),
        })
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        let mut world = self.world();
        if world.fail_create.remove(&spec.name) {
            return Err(RuntimeError::CommandFailed(format!(
                "{}: injected create failure",
                spec.name
            )));
        }
        if world.containers.contains_key(&spec.name) {
            return Err(RuntimeError::AlreadyExists(spec.name.clone()));
        }
        if !world.networks.contains_key(&spec.network) {
            return Err(RuntimeError::NotFound(spec.network.clone()));
        }
        let mut attachments = BTreeMap::new();
        attachments.insert(spec.network.clone(), spec.address.clone());
        world.containers.insert(
            spec.name.clone(),
            MockContainer {
                running: false,
                attachments,
            },
        );
        Ok(())
    }

    fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        let mut world = self.world();
        let container = world
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))?;
        container.running = true;
        Ok(())
    }

    fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        let mut world = self.world();
        let container = world
            .containers
            .get_mut(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))?;
        container.running = false;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        let mut world = self.world();
        if world.containers.remove(name).is_none() {
            return Err(RuntimeError::NotFound(name.to_owned()));
        }
        Ok(())
    }

    fn create_network(&self, name: &str, subnet: &str) -> Result<(), RuntimeError> {
        let mut world = self.world();
        if world.networks.contains_key(name) {
            return Err(RuntimeError::AlreadyExists(name.to_owned()));
        }
        world.networks.insert(name.to_owned(), subnet.to_owned());
        Ok(())
    }

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut world = self.world();
        if !world.networks.contains_key(name) {
            return Err(RuntimeError::NotFound(name.to_owned()));
        }
        let attached: Vec<&String> = world
            .containers
            .iter()
            .filter(|(_, c)| c.attachments.contains_key(name))
            .map(|(n, _)| n)
            .collect();
        if !attached.is_empty() {
            return Err(RuntimeError::CommandFailed(format!(
                "{name}: network has active endpoints"
            )));
        }
        world.networks.remove(name);
        Ok(())
    }

    fn connect(&self, network: &str, container: &str, address: &str) -> Result<(), RuntimeError> {
        let mut world = self.world();
        if !world.networks.contains_key(network) {
            return Err(RuntimeError::NotFound(network.to_owned()));
        }
        let is_router = container == self.router;
        let entry = world
            .containers
            .get_mut(container)
            .ok_or_else(|| RuntimeError::NotFound(container.to_owned()))?;
        if entry.attachments.contains_key(network) {
            return Err(RuntimeError::AlreadyConnected {
                container: container.to_owned(),
                network: network.to_owned(),
            });
        }
        entry
            .attachments
            .insert(network.to_owned(), address.to_owned());
        if is_router {
            let iface = format!("eth{}", world.next_iface);
            world.next_iface += 1;
            world.router_ifaces.push((iface, address.to_owned()));
        }
        Ok(())
    }

    fn disconnect(&self, network: &str, container: &str) -> Result<(), RuntimeError> {
        let mut world = self.world();
        let is_router = container == self.router;
        let entry = world
            .containers
            .get_mut(container)
            .ok_or_else(|| RuntimeError::NotFound(container.to_owned()))?;
        let Some(address) = entry.attachments.remove(network) else {
            return Err(RuntimeError::NotFound(network.to_owned()));
        };
        if is_router {
            world.router_ifaces.retain(|(_, a)| *a != address);
        }
        Ok(())
    }

    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, RuntimeError> {
        let mut world = self.world();
        let running = world
            .containers
            .get(container)
            .ok_or_else(|| RuntimeError::NotFound(container.to_owned()))?
            .running;
        if !running {
            return Err(RuntimeError::CommandFailed(format!(
                "{container}: container is not running"
            )));
        }
        world
            .exec_log
            .push((container.to_owned(), command.to_vec()));

        let joined = command.join(" ");
        if let Some((needle, output)) = &world.fail_exec {
            if joined.contains(needle.as_str()) {
                return Ok(ExecOutput {
                    exit_code: 2,
                    output: format!("{output}\n"),
                });
            }
        }

        if container == self.router && joined.starts_with("ip -4 addr show") {
            let output = Self::synthesize_addr_listing(&mut world);
            return Ok(ExecOutput {
                exit_code: 0,
                output,
            });
        }

        // tc / ip link / modprobe plumbing commands succeed silently
        Ok(ExecOutput {
            exit_code: 0,
            output: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn router_exists_up_front() {
        let mock = MockRuntime::new();
        assert!(mock.container_running("router"));
        assert!(mock.list_containers("nb_").unwrap().is_empty());
    }

    #[test]
    fn container_lifecycle() {
        let mock = MockRuntime::new();
        mock.create_network("nb_net_lab_pc1", "10.1.0.0/24").unwrap();
        mock.create_container(&ContainerSpec {
            name: "nb_lab_pc1".to_owned(),
            image: "nb-client:latest".to_owned(),
            hostname: "pc1".to_owned(),
            env: vec![],
            network: "nb_net_lab_pc1".to_owned(),
            address: "10.1.0.10".to_owned(),
        })
        .unwrap();

        assert!(!mock.container_running("nb_lab_pc1"));
        mock.start_container("nb_lab_pc1").unwrap();
        assert!(mock.container_running("nb_lab_pc1"));

        let info = mock.inspect_container("nb_lab_pc1").unwrap();
        assert_eq!(info.address_on("nb_net_lab_pc1"), Some("10.1.0.10"));
        assert_eq!(info.address_on("nb_net_other"), None);

        mock.stop_container("nb_lab_pc1").unwrap();
        mock.remove_container("nb_lab_pc1").unwrap();
        assert!(!mock.container_exists("nb_lab_pc1"));
    }

    #[test]
    fn router_attachments_allocate_interfaces() {
        let mock = MockRuntime::new();
        mock.create_network("net_a", "10.1.0.0/24").unwrap();
        mock.create_network("net_b", "10.2.0.0/24").unwrap();
        mock.connect("net_a", "router", "10.1.0.254").unwrap();
        mock.connect("net_b", "router", "10.2.0.254").unwrap();

        assert_eq!(mock.router_interface_for("10.1.0.254").as_deref(), Some("eth1"));
        assert_eq!(mock.router_interface_for("10.2.0.254").as_deref(), Some("eth2"));

        let out = mock
            .exec("router", &argv(&["ip", "-4", "addr", "show"]))
            .unwrap();
        assert!(out.output.contains("inet 10.1.0.254/24"));
        assert!(out.output.contains("scope global eth2"));
    }

    #[test]
    fn hidden_address_becomes_visible_after_n_listings() {
        let mock = MockRuntime::new();
        mock.create_network("net_a", "10.1.0.0/24").unwrap();
        mock.connect("net_a", "router", "10.1.0.254").unwrap();
        mock.hide_address("10.1.0.254", 2);

        let cmd = argv(&["ip", "-4", "addr", "show"]);
        assert!(!mock.exec("router", &cmd).unwrap().output.contains("10.1.0.254"));
        assert!(!mock.exec("router", &cmd).unwrap().output.contains("10.1.0.254"));
        assert!(mock.exec("router", &cmd).unwrap().output.contains("10.1.0.254"));
    }

    #[test]
    fn network_with_endpoints_cannot_be_removed() {
        let mock = MockRuntime::new();
        mock.create_network("net_a", "10.1.0.0/24").unwrap();
        mock.connect("net_a", "router", "10.1.0.254").unwrap();
        assert!(mock.remove_network("net_a").is_err());

        mock.disconnect("net_a", "router").unwrap();
        mock.remove_network("net_a").unwrap();
        assert!(!mock.network_exists("net_a"));
    }

    #[test]
    fn duplicate_connect_is_reported() {
        let mock = MockRuntime::new();
        mock.create_network("net_a", "10.1.0.0/24").unwrap();
        mock.connect("net_a", "router", "10.1.0.254").unwrap();
        assert!(matches!(
            mock.connect("net_a", "router", "10.1.0.254"),
            Err(RuntimeError::AlreadyConnected { .. })
        ));
    }

    #[test]
    fn injected_create_failure_fires_once() {
        let mock = MockRuntime::new();
        mock.create_network("net_a", "10.1.0.0/24").unwrap();
        mock.fail_create_container("nb_lab_pc1");

        let spec = ContainerSpec {
            name: "nb_lab_pc1".to_owned(),
            image: "nb-client:latest".to_owned(),
            hostname: "pc1".to_owned(),
            env: vec![],
            network: "net_a".to_owned(),
            address: "10.1.0.10".to_owned(),
        };
        assert!(mock.create_container(&spec).is_err());
        assert!(mock.create_container(&spec).is_ok());
    }

    #[test]
    fn exec_on_stopped_container_fails() {
        let mock = MockRuntime::new();
        mock.create_network("net_a", "10.1.0.0/24").unwrap();
        mock.create_container(&ContainerSpec {
            name: "nb_lab_pc1".to_owned(),
            image: "nb-client:latest".to_owned(),
            hostname: "pc1".to_owned(),
            env: vec![],
            network: "net_a".to_owned(),
            address: "10.1.0.10".to_owned(),
        })
        .unwrap();
        assert!(mock.exec("nb_lab_pc1", &argv(&["true"])).is_err());
    }
}
