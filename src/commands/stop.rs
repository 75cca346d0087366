use crate::output::UserOutput;
use std::sync::Arc;
use vehicle_runtime::{config::Settings, ServiceCatalog, Supervisor};

/// Stop every catalog service through the runtime, acknowledging each one.
pub async fn run_stop_all(
    settings: &Settings,
    catalog: Arc<dyn ServiceCatalog>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let ids = catalog.ids();
    let supervisor = Supervisor::from_settings(settings, catalog);

    let report = supervisor
        .stop_services(&ids, |id| out.success(&format!("> {} stopped", id)))
        .await;
    for error in &report.errors {
        out.error(&error.to_string());
    }
    report.into_result()?;
    Ok(())
}

pub async fn run_stop(
    settings: &Settings,
    catalog: Arc<dyn ServiceCatalog>,
    service: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let descriptor = catalog.get(service)?;
    let supervisor = Supervisor::from_settings(settings, catalog);

    supervisor.stop_service(&descriptor.id).await?;
    out.success(&format!("> {} stopped", descriptor.id));
    Ok(())
}
