//! Registry-backed router.
//!
//! A [`Router`] pairs the active resolver with the service registry for one
//! handler strategy. It holds only shared references and is never mutated, so
//! a single instance serves every request concurrently.
use std::sync::Arc;

use axum::body::Body as AxumBody;
use hyper::Request;
use thiserror::Error;

use crate::ports::{
    handler::HandlerKind,
    registry::{Registry, RegistryError, ServiceRecord},
    resolver::{Endpoint, ResolveError, Resolver},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A resolved request: where it goes and which registered versions can serve it.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub endpoint: Endpoint,
    pub services: Vec<ServiceRecord>,
}

pub struct Router {
    namespace: String,
    handler: HandlerKind,
    resolver: Arc<dyn Resolver>,
    registry: Arc<dyn Registry>,
}

impl Router {
    pub fn new(
        namespace: impl Into<String>,
        handler: HandlerKind,
        resolver: Arc<dyn Resolver>,
        registry: Arc<dyn Registry>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            handler,
            resolver,
            registry,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Handler strategy this router dispatches for.
    pub fn handler(&self) -> HandlerKind {
        self.handler
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Resolve the request and look the target up in the registry.
    ///
    /// Resolution happens before the returned future is created so the
    /// future does not borrow the (non-`Sync`) request and stays `Send`.
    pub fn route(
        &self,
        req: &Request<AxumBody>,
    ) -> impl Future<Output = Result<RouteMatch, RouteError>> + Send + '_ {
        let resolved = self.resolver.resolve(req);
        async move {
            let endpoint = resolved?;
            let services = self.registry.get_service(&endpoint.name).await?;

            tracing::debug!(
                handler = %self.handler,
                service = %endpoint.name,
                method = %endpoint.method,
                versions = services.len(),
                "routed request"
            );

            Ok(RouteMatch { endpoint, services })
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("namespace", &self.namespace)
            .field("handler", &self.handler)
            .field("resolver", &self.resolver.name())
            .finish()
    }
}
