use crate::backend::{ContainerInfo, ContainerRuntime, ContainerSpec, ContainerSummary, ExecOutput};
use crate::RuntimeError;
use std::process::Command;

/// Runtime backend shelling out to the `docker` CLI.
///
/// Errors are classified from stderr so that callers can treat
/// "already exists" and "no such" outcomes as idempotent successes.
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            binary: "docker".to_owned(),
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, RuntimeError> {
        tracing::trace!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| RuntimeError::CommandFailed(format!("{} {}: {e}", self.binary, args[0])))
    }

    /// Run a docker command, mapping failure stderr into a classified error.
    fn run_checked(&self, context: &str, args: &[&str]) -> Result<String, RuntimeError> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify(context, &stderr))
        }
    }
}

/// Map a docker CLI error message to a structured error for `context`.
fn classify(context: &str, stderr: &str) -> RuntimeError {
    let msg = stderr.to_lowercase();
    if msg.contains("no such") || msg.contains("not found") {
        RuntimeError::NotFound(context.to_owned())
    } else if msg.contains("already in use") || msg.contains("already exists") {
        RuntimeError::AlreadyExists(context.to_owned())
    } else {
        RuntimeError::CommandFailed(format!("{context}: {}", stderr.trim()))
    }
}

impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    fn available(&self) -> bool {
        self.run(&["version", "--format", "{{.Server.Version}}"])
            .is_ok_and(|o| o.status.success())
    }

    fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let stdout = self.run_checked(
            "list containers",
            &["ps", "-a", "--format", "{{.Names}}\t{{.State}}"],
        )?;
        let mut containers = Vec::new();
        for line in stdout.lines() {
            let mut parts = line.splitn(2, '\t');
            let (Some(name), Some(state)) = (parts.next(), parts.next()) else {
                continue;
            };
            if name.starts_with(prefix) {
                containers.push(ContainerSummary {
                    name: name.to_owned(),
                    running: state == "running",
                });
            }
        }
        Ok(containers)
    }

    fn inspect_container(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        let format = "{{.State.Running}};\
             {{range $k, $v := .NetworkSettings.Networks}}{{$k}}={{$v.IPAddress}},{{end}}";
        let stdout = self.run_checked(name, &["inspect", "--format", format, name])?;
        let line = stdout.trim();
        let mut parts = line.splitn(2, ';');
        let running = parts.next() == Some("true");
        let attachments = parts
            .next()
            .unwrap_or("")
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let (network, address) = entry.split_once('=').unwrap_or((entry, ""));
                (network.to_owned(), address.to_owned())
            })
            .collect();
        Ok(ContainerInfo {
            name: name.to_owned(),
            running,
            attachments,
        })
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        let mut args = vec![
            "create".to_owned(),
            "--name".to_owned(),
            spec.name.clone(),
            "--hostname".to_owned(),
            spec.hostname.clone(),
            "--restart".to_owned(),
            "unless-stopped".to_owned(),
            "--network".to_owned(),
            spec.network.clone(),
            "--ip".to_owned(),
            spec.address.clone(),
        ];
        for (k, v) in &spec.env {
            args.push("-e".to_owned());
            args.push(format!("{k}={v}"));
        }
        args.push(spec.image.clone());
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&spec.name, &args_ref)?;
        Ok(())
    }

    fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_checked(name, &["start", name])?;
        Ok(())
    }

    fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_checked(name, &["stop", name])?;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_checked(name, &["rm", "-f", name])?;
        Ok(())
    }

    fn create_network(&self, name: &str, subnet: &str) -> Result<(), RuntimeError> {
        self.run_checked(
            name,
            &[
                "network", "create", "--driver", "bridge", "--subnet", subnet, name,
            ],
        )?;
        Ok(())
    }

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.run_checked(name, &["network", "rm", name])?;
        Ok(())
    }

    fn connect(&self, network: &str, container: &str, address: &str) -> Result<(), RuntimeError> {
        let output = self.run(&["network", "connect", "--ip", address, network, container])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("already exists in network") {
            return Err(RuntimeError::AlreadyConnected {
                container: container.to_owned(),
                network: network.to_owned(),
            });
        }
        Err(classify(container, &stderr))
    }

    fn disconnect(&self, network: &str, container: &str) -> Result<(), RuntimeError> {
        self.run_checked(container, &["network", "disconnect", "-f", network, container])?;
        Ok(())
    }

    fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["exec", container];
        args.extend(command.iter().map(String::as_str));
        let output = self.run(&args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let msg = stderr.to_lowercase();
            // Exec against a missing or stopped container is a runtime error,
            // not a command failure inside the container.
            if msg.contains("no such container") {
                return Err(RuntimeError::NotFound(container.to_owned()));
            }
            if msg.contains("is not running") {
                return Err(RuntimeError::CommandFailed(format!(
                    "{container}: container is not running"
                )));
            }
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_not_found() {
        let err = classify("nb_lab_pc1", "Error: No such container: nb_lab_pc1");
        assert!(matches!(err, RuntimeError::NotFound(_)));
    }

    #[test]
    fn classify_maps_already_exists() {
        let err = classify(
            "nb_net_lab_pc1",
            "Error response from daemon: network with name nb_net_lab_pc1 already exists",
        );
        assert!(matches!(err, RuntimeError::AlreadyExists(_)));

        let err = classify(
            "nb_lab_pc1",
            "Error: the container name \"/nb_lab_pc1\" is already in use",
        );
        assert!(matches!(err, RuntimeError::AlreadyExists(_)));
    }

    #[test]
    fn classify_falls_back_to_command_failed() {
        let err = classify("nb_lab_pc1", "Error response from daemon: dial unix: refused");
        assert!(matches!(err, RuntimeError::CommandFailed(_)));
    }

    #[test]
    fn availability_check_does_not_panic() {
        let cli = DockerCli::with_binary("docker-binary-that-does-not-exist");
        assert!(!cli.available());
    }
}
