use vehicle_runtime::{app, ServiceCatalog};

pub async fn run_app(
    catalog: &dyn ServiceCatalog,
    executable: &str,
    args: &[String],
    env: &[String],
) -> anyhow::Result<()> {
    let command = app::app_command(catalog, executable, args, env)?;
    app::run_app(&command).await?;
    Ok(())
}
