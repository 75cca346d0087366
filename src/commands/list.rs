use crate::output::UserOutput;
use vehicle_runtime::ServiceCatalog;

pub fn run_list(catalog: &dyn ServiceCatalog, json: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    let services = catalog.all();

    if json {
        use serde_json::json;

        let entries = services
            .iter()
            .map(|d| {
                json!({
                    "id": d.id,
                    "image": d.image,
                    "args": d.args,
                    "port": d.port,
                    "port_forwards": d.port_forwards,
                    "start_patterns": d
                        .startup_patterns
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>(),
                })
            })
            .collect::<Vec<_>>();
        out.status(&serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if services.is_empty() {
        out.status("No services defined");
        return Ok(());
    }

    out.status("Available services:");
    for descriptor in services {
        out.status(&format!(" * '{}' ({})", descriptor.id, descriptor.image));
        for pattern in &descriptor.startup_patterns {
            out.status(&format!("     waits for: {}", pattern.as_str()));
        }
    }
    Ok(())
}
