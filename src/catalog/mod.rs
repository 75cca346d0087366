//! Service catalog: which services exist and how each one is launched.
//!
//! The supervisor consumes a catalog only through the [`ServiceCatalog`] trait.
//! [`JsonCatalog`] reads the workspace's `runtime.json`; [`StaticCatalog`] is an
//! in-memory catalog for embedders and tests.

mod descriptor;
mod json;

pub use descriptor::*;
pub use json::*;

use crate::error::{Error, Result};

/// Lookup of service descriptors by id.
pub trait ServiceCatalog: Send + Sync {
    /// Descriptor of `id`, or [`Error::ServiceNotFound`] listing the known ids.
    fn get(&self, id: &str) -> Result<ServiceDescriptor>;

    /// Every known descriptor, in catalog order.
    fn all(&self) -> Vec<ServiceDescriptor>;

    /// Ids of every known service, in catalog order.
    fn ids(&self) -> Vec<String> {
        self.all().into_iter().map(|d| d.id).collect()
    }
}

/// Catalog backed by a fixed list of descriptors.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    services: Vec<ServiceDescriptor>,
}

impl StaticCatalog {
    /// Build a catalog; duplicate ids are rejected.
    pub fn new(services: Vec<ServiceDescriptor>) -> Result<Self> {
        check_unique_ids(&services)?;
        Ok(Self { services })
    }
}

impl ServiceCatalog for StaticCatalog {
    fn get(&self, id: &str) -> Result<ServiceDescriptor> {
        find(&self.services, id)
    }

    fn all(&self) -> Vec<ServiceDescriptor> {
        self.services.clone()
    }
}

pub(crate) fn find(services: &[ServiceDescriptor], id: &str) -> Result<ServiceDescriptor> {
    services
        .iter()
        .find(|d| d.id == id)
        .cloned()
        .ok_or_else(|| Error::ServiceNotFound {
            service: id.to_string(),
            available: services.iter().map(|d| d.id.clone()).collect(),
        })
}

pub(crate) fn check_unique_ids(services: &[ServiceDescriptor]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for service in services {
        if !seen.insert(service.id.as_str()) {
            return Err(Error::Catalog(format!(
                "Service id '{}' is defined more than once",
                service.id
            )));
        }
    }
    Ok(())
}
