use super::{combined_output, ContainerRuntime, RuntimeError};
use crate::catalog::ServiceDescriptor;
use crate::service::{LaunchCommand, LogHandle};
use async_trait::async_trait;
use std::time::Duration;

/// Upper bound for `docker stop`, which itself waits up to 10s before SIGKILL.
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs every service as a host-networked container through a docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    executable: String,
    stop_timeout: Duration,
}

impl DockerRuntime {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    fn launch_command(&self, descriptor: &ServiceDescriptor) -> LaunchCommand {
        let mut cmd = LaunchCommand::new(&self.executable).args([
            "run",
            "--rm",
            "--init",
            "--name",
            descriptor.id.as_str(),
        ]);

        for (name, value) in &descriptor.env {
            let entry = match value {
                Some(value) if !value.is_empty() => format!("{}={}", name, value),
                _ => name.clone(),
            };
            cmd = cmd.arg("-e").arg(entry);
        }
        for port_forward in &descriptor.port_forwards {
            cmd = cmd.arg("-p").arg(port_forward);
        }
        for mount in &descriptor.mounts {
            cmd = cmd.arg("-v").arg(mount);
        }

        cmd.args(["--network", "host"])
            .arg(&descriptor.image)
            .args(descriptor.args.iter().cloned())
    }

    async fn stop(&self, service_id: &str, log: Option<&LogHandle>) -> Result<(), RuntimeError> {
        let cmd_str = format!("{} stop {}", self.executable, service_id);
        let result = tokio::time::timeout(
            self.stop_timeout,
            tokio::process::Command::new(&self.executable)
                .args(["stop", service_id])
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RuntimeError::exec_failed(cmd_str, e)),
            Err(_) => return Err(RuntimeError::timeout(cmd_str, self.stop_timeout)),
        };

        let text = combined_output(&output);
        if let Some(log) = log {
            if !text.is_empty() {
                if let Err(e) = log.write_line(&text) {
                    tracing::debug!("Failed to write stop output of '{}': {}", service_id, e);
                }
            }
        }

        if output.status.success() || text.contains("No such container") {
            return Ok(());
        }
        Err(RuntimeError::failed(cmd_str, &output))
    }
}
