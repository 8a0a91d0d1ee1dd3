use async_trait::async_trait;
use scc::HashMap;

use crate::ports::registry::{Registry, RegistryError, RegistryResult, ServiceRecord};

/// In-process registry keyed by service name. Each name maps to all of its
/// registered versions.
#[derive(Default)]
pub struct MemoryRegistry {
    services: HashMap<String, Vec<ServiceRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry pre-populated with `records`.
    pub async fn with_services(records: impl IntoIterator<Item = ServiceRecord>) -> Self {
        let registry = Self::new();
        for record in records {
            registry.register(record).await;
        }
        registry
    }

    /// Register (or replace) one version of a service.
    pub async fn register(&self, record: ServiceRecord) {
        let mut versions = self
            .services
            .remove_async(&record.name)
            .await
            .map(|(_, versions)| versions)
            .unwrap_or_default();

        versions.retain(|existing| existing.version != record.version);
        tracing::debug!(service = %record.name, version = %record.version, "registering service");
        versions.push(record.clone());

        let _ = self.services.insert_async(record.name, versions).await;
    }

    /// Remove every version of `name`.
    pub async fn deregister(&self, name: &str) -> bool {
        self.services.remove_async(name).await.is_some()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get_service(&self, name: &str) -> RegistryResult<Vec<ServiceRecord>> {
        self.services
            .get_async(name)
            .await
            .map(|entry| entry.get().clone())
            .filter(|versions| !versions.is_empty())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    async fn list_services(&self) -> RegistryResult<Vec<ServiceRecord>> {
        let mut all = Vec::new();
        self.services
            .retain_async(|_, versions| {
                all.extend(versions.iter().cloned());
                true
            })
            .await;
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(all)
    }
}
