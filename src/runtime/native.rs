use super::{ContainerRuntime, RuntimeError};
use crate::catalog::ServiceDescriptor;
use crate::service::{LaunchCommand, LogHandle};
use async_trait::async_trait;

/// Runs the descriptor image directly as a local executable.
///
/// Port forwards and mounts have no meaning here and are ignored. Stopping is
/// left entirely to terminating the tracked local process.
#[derive(Debug, Clone, Default)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        NativeRuntime
    }
}

#[async_trait]
impl ContainerRuntime for NativeRuntime {
    fn name(&self) -> &str {
        "native"
    }

    fn launch_command(&self, descriptor: &ServiceDescriptor) -> LaunchCommand {
        if !descriptor.port_forwards.is_empty() || !descriptor.mounts.is_empty() {
            tracing::debug!(
                "Native runtime ignores port forwards and mounts of '{}'",
                descriptor.id
            );
        }

        let mut cmd = LaunchCommand::new(&descriptor.image).args(descriptor.args.iter().cloned());
        for (name, value) in &descriptor.env {
            match value {
                Some(value) => cmd = cmd.env(name, value),
                None => {
                    if let Ok(parent) = std::env::var(name) {
                        cmd = cmd.env(name, parent);
                    }
                }
            }
        }
        cmd
    }

    async fn stop(&self, _service_id: &str, _log: Option<&LogHandle>) -> Result<(), RuntimeError> {
        Ok(())
    }
}
