use crate::output::UserOutput;
use std::sync::Arc;
use vehicle_runtime::{
    config::Settings, Error, ServiceCatalog, ShutdownCoordinator, Supervisor, WatchExit,
};

pub async fn run_start(
    settings: &Settings,
    catalog: Arc<dyn ServiceCatalog>,
    service: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    // Unknown ids fail before any signal handler or process is set up.
    let descriptor = catalog.get(service)?;

    let shutdown = ShutdownCoordinator::new();
    shutdown.install();
    let supervisor = Supervisor::from_settings(settings, catalog).with_cancellation(shutdown.token());

    out.status(&format!("Starting '{}' ({})", descriptor.id, supervisor.runtime().name()));
    match supervisor.start_service(&descriptor).await {
        Ok(info) => out.success(&format!("> {} running", info.service_id)),
        Err(e) => return Err(startup_failed(&supervisor, e, out).await),
    }

    watch(&supervisor, &shutdown, settings, out).await
}

pub async fn run_start_all(
    settings: &Settings,
    catalog: Arc<dyn ServiceCatalog>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let descriptors = catalog.all();
    if descriptors.is_empty() {
        out.warning("No services defined in the catalog");
        return Ok(());
    }

    let shutdown = ShutdownCoordinator::new();
    shutdown.install();
    let supervisor = Supervisor::from_settings(settings, catalog).with_cancellation(shutdown.token());

    out.status(&format!(
        "Starting {} service(s) ({})",
        descriptors.len(),
        supervisor.runtime().name()
    ));
    let started = supervisor
        .start_all_with(&descriptors, |info| {
            out.success(&format!("> {} running", info.service_id))
        })
        .await;
    if let Err(e) = started {
        return Err(startup_failed(&supervisor, e, out).await);
    }

    out.blank();
    out.success("Runtime is ready to use!");
    watch(&supervisor, &shutdown, settings, out).await
}

/// Report a failed start. An aborted start also stops whatever is still tracked.
async fn startup_failed(
    supervisor: &Supervisor,
    error: Error,
    out: &dyn UserOutput,
) -> anyhow::Error {
    match &error {
        Error::StartupFailed { service, log, .. } => out.log_dump(service, log),
        Error::Aborted => {
            let report = supervisor.stop_all().await;
            for stop_error in &report.errors {
                out.error(&stop_error.to_string());
            }
        }
        _ => {}
    }
    error.into()
}

/// Supervise until a shutdown signal arrives or every service has exited.
async fn watch(
    supervisor: &Supervisor,
    shutdown: &ShutdownCoordinator,
    settings: &Settings,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let exit = supervisor
        .run_until_shutdown(&shutdown.token(), settings.watch_interval, |id, state| {
            out.warning(&format!("Process terminated: '{}' result: {}", id, state))
        })
        .await;

    match exit {
        WatchExit::Shutdown(report) => {
            for id in &report.stopped {
                out.success(&format!("> {} stopped", id));
            }
            report.into_result()?;
        }
        WatchExit::AllExited => {
            out.status("All services have terminated");
            out.status("Hint: Log files can be found in your workspace's logs directory");
        }
    }
    Ok(())
}
