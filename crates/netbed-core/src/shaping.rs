//! Traffic-control plumbing on the router side.
//!
//! For every device interface the engine installs an HTB hierarchy for
//! downstream shaping and mirrors it onto a paired IFB device for upstream
//! shaping (ingress traffic redirected through a u32 mirred filter). The
//! engine only provisions the hierarchy; rate values on it are managed by
//! external consumers.

use crate::CoreError;
use netbed_runtime::ContainerRuntime;

/// One command of a shaping sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeCmd {
    pub args: Vec<String>,
    /// Whether a non-zero exit is acceptable (teardown deletes, module and
    /// link provisioning that may already be in place).
    pub tolerate_failure: bool,
}

impl ShapeCmd {
    pub fn strict(line: String) -> Self {
        Self {
            args: line.split_whitespace().map(str::to_owned).collect(),
            tolerate_failure: false,
        }
    }

    pub fn tolerant(line: String) -> Self {
        Self {
            args: line.split_whitespace().map(str::to_owned).collect(),
            tolerate_failure: true,
        }
    }
}

/// The shaping sequence for a freshly discovered interface.
///
/// Downstream HTB under handle 1: on the physical interface, then the IFB
/// provisioning and ingress redirect, then the mirrored HTB under handle 2:
/// on the IFB.
pub fn init_commands(interface: &str, ifb: &str) -> Vec<ShapeCmd> {
    vec![
        ShapeCmd::strict(format!(
            "tc qdisc add dev {interface} root handle 1: htb default 30"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {interface} parent 1: classid 1:1 htb rate 10gbit"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {interface} parent 1:1 classid 1:10 htb rate 50mbit ceil 100mbit prio 1"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {interface} parent 1:1 classid 1:20 htb rate 30mbit ceil 80mbit prio 2"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {interface} parent 1:1 classid 1:30 htb rate 10gbit ceil 10gbit prio 3"
        )),
        ShapeCmd::tolerant("modprobe ifb numifbs=32".to_owned()),
        ShapeCmd::tolerant(format!("ip link add {ifb} type ifb")),
        ShapeCmd::strict(format!("ip link set {ifb} up")),
        ShapeCmd::strict(format!("tc qdisc add dev {interface} ingress")),
        ShapeCmd::strict(format!(
            "tc filter add dev {interface} parent ffff: protocol ip u32 match u32 0 0 flowid 1:1 action mirred egress redirect dev {ifb}"
        )),
        ShapeCmd::strict(format!(
            "tc qdisc add dev {ifb} root handle 2: htb default 30"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {ifb} parent 2: classid 2:1 htb rate 10gbit"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {ifb} parent 2:1 classid 2:10 htb rate 50mbit ceil 100mbit prio 1"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {ifb} parent 2:1 classid 2:20 htb rate 30mbit ceil 80mbit prio 2"
        )),
        ShapeCmd::strict(format!(
            "tc class add dev {ifb} parent 2:1 classid 2:30 htb rate 10gbit ceil 10gbit prio 3"
        )),
    ]
}

/// The teardown sequence. Every command tolerates failure: deleting the root
/// qdisc removes its classes, and any of the targets may already be gone.
pub fn teardown_commands(interface: &str, ifb: Option<&str>) -> Vec<ShapeCmd> {
    let mut commands = vec![
        ShapeCmd::tolerant(format!("tc qdisc del dev {interface} root")),
        ShapeCmd::tolerant(format!("tc qdisc del dev {interface} ingress")),
    ];
    if let Some(ifb) = ifb {
        commands.push(ShapeCmd::tolerant(format!("tc qdisc del dev {ifb} root")));
        commands.push(ShapeCmd::tolerant(format!("ip link set {ifb} down")));
        commands.push(ShapeCmd::tolerant(format!("ip link del {ifb}")));
    }
    commands
}

/// Run a shaping sequence inside the router container.
///
/// "File exists" output is swallowed for every command so re-running a
/// sequence over existing state is idempotent; other failures abort unless
/// the command tolerates them.
pub fn apply_commands(
    runtime: &dyn ContainerRuntime,
    router: &str,
    commands: &[ShapeCmd],
) -> Result<(), CoreError> {
    for cmd in commands {
        let out = runtime.exec(router, &cmd.args)?;
        if out.success() {
            continue;
        }
        if cmd.tolerate_failure || out.output.contains("File exists") {
            tracing::debug!(
                "shaping command tolerated ({}): {}",
                cmd.args.join(" "),
                out.output.trim()
            );
            continue;
        }
        return Err(CoreError::ShapingFailed {
            command: cmd.args.join(" "),
            output: out.output.trim().to_owned(),
        });
    }
    Ok(())
}
