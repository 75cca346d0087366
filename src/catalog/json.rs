//! Loader for the workspace runtime description (`runtime.json`).
//!
//! ```json
//! [
//!   {
//!     "id": "mqtt-broker",
//!     "interfaces": ["pubsub"],
//!     "config": [
//!       { "key": "image", "value": "${{ mqttBrokerImage }}" },
//!       { "key": "port-forward", "value": "1883:1883" },
//!       { "key": "start-pattern", "value": ".*mosquitto.*running.*" }
//!     ]
//!   }
//! ]
//! ```

use super::{check_unique_ids, find, ServiceCatalog, ServiceDescriptor};
use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize)]
struct RawService {
    id: String,
    #[serde(default)]
    config: Vec<RawConfigEntry>,
}

#[derive(Debug, Deserialize)]
struct RawConfigEntry {
    key: String,
    value: String,
}

/// Catalog read from a `runtime.json` file.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    services: Vec<ServiceDescriptor>,
}

impl JsonCatalog {
    /// Load and validate the catalog. `${{ name }}` placeholders are resolved
    /// from the process environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Catalog(format!(
                "Failed to read runtime description '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content, |name| std::env::var(name).ok())
    }

    /// Parse catalog JSON, resolving placeholders through `lookup`.
    pub fn parse<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: Vec<RawService> = serde_json::from_str(content)
            .map_err(|e| Error::Catalog(format!("Failed to parse runtime description: {}", e)))?;

        let services = raw
            .into_iter()
            .map(|service| Self::descriptor(service, &lookup))
            .collect::<Result<Vec<_>>>()?;
        check_unique_ids(&services)?;

        Ok(Self { services })
    }

    fn descriptor<F>(raw: RawService, lookup: &F) -> Result<ServiceDescriptor>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut image = None;
        let mut descriptor = ServiceDescriptor::new(raw.id.clone(), String::new());

        for entry in raw.config {
            let value = substitute(&entry.value, lookup).map_err(|name| {
                Error::Catalog(format!(
                    "Service '{}': variable '{}' used in '{}' is not set",
                    raw.id, name, entry.key
                ))
            })?;

            match entry.key.as_str() {
                "image" => image = Some(value),
                "arg" => descriptor = descriptor.arg(value),
                "env" => {
                    let (name, value) = ServiceDescriptor::parse_env_entry(&value);
                    descriptor.env.insert(name, value);
                }
                "port-forward" => descriptor = descriptor.port_forward(value),
                "mount" => descriptor = descriptor.mount(value),
                "start-pattern" => descriptor = descriptor.startup_pattern(&value)?,
                "port" => descriptor = descriptor.port(value),
                other => {
                    tracing::debug!(
                        "Ignoring unknown config key '{}' of service '{}'",
                        other,
                        raw.id
                    );
                }
            }
        }

        descriptor.image = image.ok_or_else(|| {
            Error::Catalog(format!("Service '{}' has no 'image' configured", raw.id))
        })?;
        Ok(descriptor)
    }
}

impl ServiceCatalog for JsonCatalog {
    fn get(&self, id: &str) -> Result<ServiceDescriptor> {
        find(&self.services, id)
    }

    fn all(&self) -> Vec<ServiceDescriptor> {
        self.services.clone()
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("static regex pattern is valid")
    })
}

/// Replace every `${{ name }}` in `value`. Returns the first unresolved name on failure.
fn substitute<F>(value: &str, lookup: &F) -> std::result::Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in placeholder_regex().captures_iter(value) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let resolved = lookup(name.as_str()).ok_or_else(|| name.as_str().to_string())?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(&resolved);
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}
