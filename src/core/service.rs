use std::sync::Arc;

use crate::{
    core::lifecycle::Lifecycle,
    ports::{http_client::HttpClient, publisher::Publisher, registry::Registry, rpc_client::RpcClient},
};

/// The service that owns the gateway: its identity, the collaborators
/// handlers call into, and the lifecycle the gateway hooks its shutdown onto.
pub struct Service {
    name: String,
    version: String,
    registry: Arc<dyn Registry>,
    client: Arc<dyn RpcClient>,
    publisher: Arc<dyn Publisher>,
    http_client: Arc<dyn HttpClient>,
    lifecycle: Lifecycle,
}

impl Service {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        registry: Arc<dyn Registry>,
        client: Arc<dyn RpcClient>,
        publisher: Arc<dyn Publisher>,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            registry,
            client,
            publisher,
            http_client,
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn registry(&self) -> Arc<dyn Registry> {
        self.registry.clone()
    }

    pub fn client(&self) -> &Arc<dyn RpcClient> {
        &self.client
    }

    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.http_client
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}
