//! Router-side interface discovery.
//!
//! A freshly attached network gives the router a new veth interface with a
//! runtime-assigned name. There is no fixed mapping from network to name, so
//! the engine polls the authoritative source (`ip -4 addr show` inside the
//! router) until the interface carrying the router's address appears.

use crate::CoreError;
use netbed_runtime::ContainerRuntime;
use std::time::Duration;

/// Bounded retry policy for interface discovery.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Find the interface carrying `address` in `ip -4 addr show` output.
///
/// Matches `inet {address}/` exactly: a plain substring check would accept
/// `10.1.0.254` for a search of `10.1.0.25`. The trailing token of a
/// matching line is accepted only if it looks like a real interface name.
pub fn parse_interface_listing(listing: &str, address: &str) -> Option<String> {
    let needle = format!("inet {address}/");
    for line in listing.lines() {
        let line = line.trim();
        if !line.contains(&needle) {
            continue;
        }
        if let Some(candidate) = line.split_whitespace().last() {
            if is_interface_name(candidate) {
                return Some(candidate.to_owned());
            }
        }
    }
    None
}

fn is_interface_name(name: &str) -> bool {
    ["eth", "enp", "ens"].iter().any(|prefix| {
        name.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
    })
}

/// Poll the router for the interface carrying `address`.
///
/// Exec failures and missing interfaces both consume an attempt; the delay
/// is applied between attempts, not after the last one.
pub fn discover_interface(
    runtime: &dyn ContainerRuntime,
    router: &str,
    address: &str,
    policy: DiscoveryPolicy,
) -> Result<String, CoreError> {
    let command: Vec<String> = ["ip", "-4", "addr", "show"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();

    for attempt in 1..=policy.attempts {
        if attempt > 1 {
            std::thread::sleep(policy.delay);
        }
        match runtime.exec(router, &command) {
            Ok(out) if out.success() => {
                if let Some(interface) = parse_interface_listing(&out.output, address) {
                    tracing::debug!("discovered interface {interface} for {address}");
                    return Ok(interface);
                }
            }
            Ok(out) => {
                tracing::warn!(
                    "interface listing attempt {attempt} exited {}: {}",
                    out.exit_code,
                    out.output.trim()
                );
            }
            Err(e) => {
                tracing::warn!("interface listing attempt {attempt} failed: {e}");
            }
        }
    }

    Err(CoreError::DiscoveryTimeout {
        address: address.to_owned(),
        attempts: policy.attempts,
    })
}
