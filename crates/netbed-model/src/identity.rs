//! Deterministic network identity planning.
//!
//! Every device's infrastructure names and addresses are derived from its
//! cluster name, device name, and an allocated /24 block, so that create and
//! destroy can recompute the same resources at any time.

use crate::types::{ContainerName, NetworkName};
use crate::ModelError;

/// Host suffix assigned to the device inside its /24.
const DEVICE_HOST: u8 = 10;
/// Host suffix assigned to the router on every device network.
const ROUTER_HOST: u8 = 254;

/// The complete network identity of one device, fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    pub subnet: String,
    pub network_name: NetworkName,
    pub container_name: ContainerName,
    pub address: String,
    pub router_address: String,
}

impl NetworkPlan {
    /// Derive the plan for `device` in `cluster` on the `10.{octet}.0.0/24`
    /// block, using `prefix` as the managed-resource marker (e.g. "nb_").
    pub fn derive(prefix: &str, cluster: &str, device: &str, octet: u8) -> Self {
        Self {
            subnet: format!("10.{octet}.0.0/24"),
            network_name: NetworkName::new(format!("{prefix}net_{cluster}_{device}")),
            container_name: ContainerName::new(format!("{prefix}{cluster}_{device}")),
            address: format!("10.{octet}.0.{DEVICE_HOST}"),
            router_address: format!("10.{octet}.0.{ROUTER_HOST}"),
        }
    }
}

/// Parse the second octet out of a `10.N.0.0/24` subnet string.
pub fn subnet_octet(subnet: &str) -> Result<u8, ModelError> {
    let mut parts = subnet.split('.');
    let (first, second) = (parts.next(), parts.next());
    match (first, second) {
        (Some("10"), Some(n)) => n
            .parse::<u8>()
            .map_err(|_| ModelError::MalformedSubnet(subnet.to_owned())),
        _ => Err(ModelError::MalformedSubnet(subnet.to_owned())),
    }
}

/// Pick the first free second octet given the octets already in use.
pub fn next_free_octet(used: &[u8]) -> Result<u8, ModelError> {
    (1..255)
        .find(|n| !used.contains(n))
        .ok_or(ModelError::SubnetsExhausted)
}

/// Derive the paired ingress-redirect device name from a router interface
/// name: the trailing digit run of the interface, prefixed with `ifb`
/// ("eth5" -> "ifb5"). Returns `None` for names with no digits.
pub fn ifb_for_interface(interface: &str) -> Option<String> {
    let digits: String = interface.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("ifb{digits}"))
    }
}

/// Validate a cluster or device name: 1-64 characters from `[a-zA-Z0-9_-]`.
pub fn validate_name(name: &str) -> Result<(), ModelError> {
    if name.is_empty() || name.len() > 64 {
        return Err(ModelError::InvalidName {
            name: name.to_owned(),
            reason: "must be 1-64 characters".to_owned(),
        });
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ModelError::InvalidName {
            name: name.to_owned(),
            reason: "must match [a-zA-Z0-9_-]".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_deterministic() {
        let a = NetworkPlan::derive("nb_", "lab", "pc1", 3);
        let b = NetworkPlan::derive("nb_", "lab", "pc1", 3);
        assert_eq!(a, b);
        assert_eq!(a.subnet, "10.3.0.0/24");
        assert_eq!(a.network_name, "nb_net_lab_pc1");
        assert_eq!(a.container_name, "nb_lab_pc1");
        assert_eq!(a.address, "10.3.0.10");
        assert_eq!(a.router_address, "10.3.0.254");
    }

    #[test]
    fn subnet_octet_parses() {
        assert_eq!(subnet_octet("10.7.0.0/24").unwrap(), 7);
        assert!(subnet_octet("192.168.0.0/24").is_err());
        assert!(subnet_octet("10.x.0.0/24").is_err());
    }

    #[test]
    fn next_free_octet_skips_used() {
        assert_eq!(next_free_octet(&[]).unwrap(), 1);
        assert_eq!(next_free_octet(&[1, 2, 4]).unwrap(), 3);
    }

    #[test]
    fn next_free_octet_exhaustion() {
        let all: Vec<u8> = (1..255).collect();
        assert!(next_free_octet(&all).is_err());
    }

    #[test]
    fn ifb_naming_rule() {
        assert_eq!(ifb_for_interface("eth5").as_deref(), Some("ifb5"));
        assert_eq!(ifb_for_interface("eth12").as_deref(), Some("ifb12"));
        assert_eq!(ifb_for_interface("lo"), None);
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("lab-1_a").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name(&"x".repeat(65)).is_err());
    }
}
