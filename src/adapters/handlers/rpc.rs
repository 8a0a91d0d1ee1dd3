use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Method, Request, Response};
use serde::Deserialize;

use super::{header_map, json_payload, json_response, read_body, require_node};
use crate::{
    core::{router::Router, service::Service},
    ports::{
        handler::{ApiHandler, HandlerError, HandlerKind},
        rpc_client::RpcRequest,
    },
};

/// Forwards the JSON body (or query string) of a request to the resolved
/// service endpoint and returns the JSON answer unchanged.
pub struct RpcHandler {
    router: Arc<Router>,
    service: Arc<Service>,
}

impl RpcHandler {
    pub fn new(router: Arc<Router>, service: Arc<Service>) -> Self {
        Self { router, service }
    }
}

#[async_trait]
impl ApiHandler for RpcHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Rpc
    }

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        let route = self.router.route(&req).await?;
        let node = require_node(&route.endpoint.name, &route.services)?;

        let (parts, body) = req.into_parts();
        let payload = json_payload(&parts.uri, &read_body(body).await?)?;

        let answer = self
            .service
            .client()
            .call(RpcRequest {
                service: route.endpoint.name,
                endpoint: route.endpoint.method,
                address: node.address.clone(),
                headers: header_map(&parts.headers),
                body: payload,
            })
            .await?;

        json_response(&answer)
    }
}

#[derive(Debug, Deserialize)]
struct DirectCall {
    #[serde(default)]
    service: String,
    #[serde(default, alias = "method")]
    endpoint: String,
    #[serde(default)]
    request: serde_json::Value,
}

/// The `/rpc` endpoint: the caller names service and endpoint explicitly in
/// the body, so no resolver is involved.
pub struct DirectRpcHandler {
    service: Arc<Service>,
}

impl DirectRpcHandler {
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ApiHandler for DirectRpcHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Rpc
    }

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        if req.method() != Method::POST {
            return Err(HandlerError::BadRequest(format!(
                "method {} not allowed, use POST",
                req.method()
            )));
        }

        let (parts, body) = req.into_parts();
        let call: DirectCall = serde_json::from_slice(&read_body(body).await?)
            .map_err(|e| HandlerError::BadRequest(format!("invalid rpc request: {e}")))?;

        if call.service.is_empty() {
            return Err(HandlerError::BadRequest("invalid service".to_string()));
        }
        if call.endpoint.is_empty() {
            return Err(HandlerError::BadRequest("invalid endpoint".to_string()));
        }

        let services = self
            .service
            .registry()
            .get_service(&call.service)
            .await
            .map_err(|e| HandlerError::NotFound(e.to_string()))?;
        let node = require_node(&call.service, &services)?;

        let request = if call.request.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            call.request
        };

        let answer = self
            .service
            .client()
            .call(RpcRequest {
                service: call.service,
                endpoint: call.endpoint,
                address: node.address.clone(),
                headers: header_map(&parts.headers),
                body: request,
            })
            .await?;

        json_response(&answer)
    }
}
