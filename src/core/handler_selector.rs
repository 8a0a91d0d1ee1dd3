//! Handler selection by configured name.
//!
//! Every strategy gets a router of its own (resolver, namespace, handler tag
//! and registry) and is bound to the owning service before it is mounted.
use std::{fmt, sync::Arc};

use crate::{
    adapters::handlers::{
        ApiRequestHandler, EventHandler, HttpProxyHandler, MetaHandler, RpcHandler, WebHandler,
    },
    config::models::GatewayConfig,
    core::{error::GatewayError, resolver_selector::select_resolver, router::Router, service::Service},
    ports::{
        handler::{ApiHandler, BoxHandler, HandlerKind, into_service},
        resolver::ResolverOptions,
    },
};

/// Mount point used by the HTTP proxy: a single service-name segment.
pub const PROXY_MOUNT: &str = "/{service}";

/// Where a selected handler is attached to the gateway router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountPath {
    /// Everything at and below the given path.
    Prefix(String),
    /// `/{service}` and everything below it.
    Proxy,
}

impl fmt::Display for MountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(path) => f.write_str(path),
            Self::Proxy => f.write_str(PROXY_MOUNT),
        }
    }
}

/// A constructed handler strategy and the path it must be mounted on.
pub struct HandlerSelection {
    pub kind: HandlerKind,
    pub mount: MountPath,
    pub handler: BoxHandler,
}

impl fmt::Debug for HandlerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSelection")
            .field("kind", &self.kind)
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}

fn build(kind: HandlerKind, router: Arc<Router>, service: Arc<Service>) -> Arc<dyn ApiHandler> {
    match kind {
        HandlerKind::Rpc => Arc::new(RpcHandler::new(router, service)),
        HandlerKind::Api => Arc::new(ApiRequestHandler::new(router, service)),
        HandlerKind::Event => Arc::new(EventHandler::new(router, service)),
        HandlerKind::Http => Arc::new(HttpProxyHandler::new(router, service)),
        HandlerKind::Web => Arc::new(WebHandler::new(router, service)),
        HandlerKind::Meta => Arc::new(MetaHandler::new(router, service)),
    }
}

fn mount_for(kind: HandlerKind, config: &GatewayConfig) -> Result<MountPath, GatewayError> {
    match kind {
        HandlerKind::Http => Ok(MountPath::Proxy),
        _ if config.api_path.starts_with('/') => Ok(MountPath::Prefix(config.api_path.clone())),
        _ => Err(GatewayError::HandlerConstruction {
            handler: kind.to_string(),
            reason: format!("api path {:?} must start with '/'", config.api_path),
        }),
    }
}

/// Build the handler strategy named `name`. Unknown names select `meta`.
pub fn select_handler(
    name: &str,
    config: &GatewayConfig,
    service: &Arc<Service>,
) -> Result<HandlerSelection, GatewayError> {
    let kind = HandlerKind::from_name(name).unwrap_or_else(|| {
        tracing::warn!(handler = %name, "unknown handler, using meta handler");
        HandlerKind::Meta
    });
    let mount = mount_for(kind, config)?;

    tracing::info!(handler = %kind, path = %mount, "registering handler");

    let resolver = select_resolver(
        &config.resolver,
        ResolverOptions::new(config.namespace.clone(), kind.as_str()),
    );
    let router = Arc::new(Router::new(
        config.namespace.clone(),
        kind,
        resolver,
        service.registry(),
    ));
    let handler = build(kind, router, service.clone());

    Ok(HandlerSelection {
        kind,
        mount,
        handler: into_service(handler),
    })
}
