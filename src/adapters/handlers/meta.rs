use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use serde_json::json;

use super::json_response;
use crate::{
    core::{router::Router, service::Service},
    ports::handler::{ApiHandler, HandlerError, HandlerKind},
};

/// Default handler. Answers with what the router resolved for the request:
/// the target service and endpoint, its registered versions and nodes.
pub struct MetaHandler {
    router: Arc<Router>,
    service: Arc<Service>,
}

impl MetaHandler {
    pub fn new(router: Arc<Router>, service: Arc<Service>) -> Self {
        Self { router, service }
    }
}

#[async_trait]
impl ApiHandler for MetaHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Meta
    }

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        let route = self.router.route(&req).await?;

        let versions: Vec<&str> = route.services.iter().map(|s| s.version.as_str()).collect();
        let nodes: Vec<_> = route
            .services
            .iter()
            .flat_map(|s| s.nodes.iter())
            .map(|n| json!({ "id": n.id, "address": n.address }))
            .collect();

        json_response(&json!({
            "gateway": self.service.name(),
            "service": route.endpoint.name,
            "endpoint": route.endpoint.method,
            "path": route.endpoint.path,
            "versions": versions,
            "nodes": nodes,
        }))
    }
}
