mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use output::{CliOutput, QuietOutput, UserOutput};
use std::sync::Arc;
use vehicle_runtime::config::{Settings, SettingsOverrides};
use vehicle_runtime::{Error as VrtError, JsonCatalog, ServiceCatalog};

/// Exit status after an interrupted start, as a shell reports SIGINT.
const EXIT_ABORTED: i32 = 130;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The application's own output is the user feedback; only its code
        // is propagated.
        if let Some(VrtError::AppFailed {
            exit_code: Some(code),
            ..
        }) = e.downcast_ref::<VrtError>()
        {
            std::process::exit(*code);
        }

        if let Some(vrt_error) = e.downcast_ref::<VrtError>() {
            if matches!(vrt_error, VrtError::Aborted) {
                eprintln!("Aborted");
                std::process::exit(EXIT_ABORTED);
            }
            eprintln!("Error: {}", vrt_error);
            if let Some(suggestion) = vrt_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet)?;

    let out: &dyn UserOutput = if cli.quiet { &QuietOutput } else { &CliOutput };

    let workspace = Settings::resolve_workspace(cli.workspace, |key| std::env::var(key).ok())?;
    let overrides = SettingsOverrides {
        runtime: cli.runtime,
        startup_timeout: cli.timeout,
        catalog: cli.catalog,
        logs_dir: None,
    };
    let settings = Settings::load(workspace, cli.config.as_deref(), &overrides)?;
    let catalog: Arc<dyn ServiceCatalog> = Arc::new(JsonCatalog::load(&settings.catalog)?);

    match cli.command {
        Commands::Start { service } => commands::run_start(&settings, catalog, &service, out).await,
        Commands::StartAll => commands::run_start_all(&settings, catalog, out).await,
        Commands::StopAll => commands::run_stop_all(&settings, catalog, out).await,
        Commands::Stop { service } => commands::run_stop(&settings, catalog, &service, out).await,
        Commands::List { json } => commands::run_list(catalog.as_ref(), json, out),
        Commands::RunApp {
            env,
            executable,
            args,
        } => commands::run_app(catalog.as_ref(), &executable, &args, &env).await,
    }
}

fn init_tracing(quiet: bool) -> anyhow::Result<()> {
    let default_level = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(())
}
