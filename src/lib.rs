//! # Vehicle Runtime
//!
//! Starts, supervises and tears down the sidecar services (broker, data
//! store, mock backends, the application itself) of a local vehicle runtime.
//!
//! ## Features
//!
//! - **Service catalog**: services are described in the workspace's
//!   `runtime.json` ([`JsonCatalog`]) or built in code ([`StaticCatalog`])
//! - **Readiness by log matching**: a start only succeeds once every start
//!   pattern of the service has matched a line of its output
//! - **Rollback**: a failing start-all stops everything it already started
//! - **Runtimes**: services run as docker containers or as local executables
//! - **Shutdown**: SIGINT/SIGTERM stop every tracked service exactly once
//! - **Applications**: [`app::run_app`] runs a vehicle app wired to the
//!   catalog's brokers
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vehicle_runtime::{config::Settings, JsonCatalog, Supervisor};
//!
//! # async fn example() -> Result<(), vehicle_runtime::Error> {
//! let settings = Settings::for_workspace(".");
//! let catalog = Arc::new(JsonCatalog::load(&settings.catalog)?);
//!
//! let supervisor = Supervisor::from_settings(&settings, catalog);
//! supervisor.start_all().await?;
//!
//! // ... use the services ...
//!
//! supervisor.stop_all().await.into_result()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - Supervisor methods take `&self`; the registry is behind an async mutex
//! - Starts and stops of the same service id are mutually exclusive
//! - Starts within a start-all are strictly sequential
//! - Signal handlers only cancel a token; stop-all runs in the foreground loop

pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod runtime;
pub mod service;
pub mod supervisor;

pub use catalog::{JsonCatalog, ServiceCatalog, ServiceDescriptor, StaticCatalog};
pub use error::{Error, Result, StartupFailure, StopError};
pub use runtime::{ContainerRuntime, DockerRuntime, NativeRuntime, RuntimeError};
pub use service::{ProcessInfo, ProcessState, ReadinessOutcome};
pub use supervisor::{ShutdownCoordinator, StopReport, Supervisor, SupervisorOptions, WatchExit};
