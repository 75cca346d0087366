//! Container runtimes: how a service descriptor becomes a command line, and
//! how a running service is stopped through the runtime itself.
//!
//! - [`DockerRuntime`] - `docker run --rm --init --name <id> ...` / `docker stop <id>`
//! - [`NativeRuntime`] - runs the descriptor image as a local executable

mod docker;
mod error;
mod native;

pub use docker::*;
pub use error::*;
pub use native::*;

use crate::catalog::ServiceDescriptor;
use crate::config::{RuntimeKind, Settings};
use crate::service::{LaunchCommand, LogHandle};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Short name for logs ("docker", "native").
    fn name(&self) -> &str;

    /// Command line that starts `descriptor` in the foreground.
    fn launch_command(&self, descriptor: &ServiceDescriptor) -> LaunchCommand;

    /// Stop `service_id` through the runtime. A service the runtime does not
    /// know counts as stopped. Command output goes to `log` when given.
    async fn stop(&self, service_id: &str, log: Option<&LogHandle>) -> Result<(), RuntimeError>;
}

/// Runtime selected by `settings`.
pub fn runtime_for(settings: &Settings) -> Arc<dyn ContainerRuntime> {
    match settings.runtime {
        RuntimeKind::Docker => Arc::new(DockerRuntime::new(settings.runtime_executable.clone())),
        RuntimeKind::Native => Arc::new(NativeRuntime::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_for_settings() {
        let mut settings = Settings::for_workspace("/ws");
        assert_eq!(runtime_for(&settings).name(), "docker");

        settings.runtime = RuntimeKind::Native;
        assert_eq!(runtime_for(&settings).name(), "native");
    }
}
