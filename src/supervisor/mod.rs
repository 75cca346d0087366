//! The service supervisor: registry of running services, start/stop
//! operations and the foreground shutdown loop.

mod core;
mod registry;
mod shutdown;

pub use self::core::{StopReport, Supervisor, SupervisorOptions};
pub use registry::Registry;
pub use shutdown::{ShutdownCoordinator, WatchExit};
