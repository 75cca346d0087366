use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use vehicle_runtime::config::{parse_duration_string, RuntimeKind};

#[derive(Parser)]
#[command(name = "vrt")]
#[command(about = "Vehicle runtime - start and supervise the local runtime services")]
pub struct Cli {
    /// Settings file (defaults to vehicle-runtime.yaml in the workspace)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Workspace directory (defaults to the current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Service catalog (defaults to runtime.json in the workspace)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Runtime used to launch services: docker or native
    #[arg(long, value_name = "KIND")]
    pub runtime: Option<RuntimeKind>,

    /// Startup timeout per service (e.g. 30s, 2m)
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start one service and supervise it until interrupted
    Start {
        /// Id of the service in the catalog
        service: String,
    },
    /// Start every catalog service in order and supervise them until interrupted
    #[command(alias = "up")]
    StartAll,
    /// Stop every catalog service
    #[command(alias = "down")]
    StopAll,
    /// Stop one service
    Stop {
        /// Id of the service in the catalog
        service: String,
    },
    /// List the services of the catalog
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a vehicle application against the runtime services
    RunApp {
        /// Extra environment variable for the application (NAME=VALUE)
        #[arg(short, long = "env", value_name = "NAME=VALUE")]
        env: Vec<String>,

        /// Path of the application executable
        executable: String,

        /// Arguments passed to the application (put the command after `--`
        /// when they clash with vrt's own flags)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    parse_duration_string(value)
        .ok_or_else(|| format!("invalid duration '{}' (expected e.g. 500ms, 30s, 2m)", value))
}
