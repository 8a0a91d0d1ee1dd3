//! Handler strategies. Each one is bound to a [`Router`] and the owning
//! [`Service`] at startup and is then shared read-only by every request.
pub mod api;
pub mod event;
pub mod http;
pub mod meta;
pub mod rpc;
pub mod web;

use std::collections::HashMap;

use axum::{body::Body as AxumBody, extract::Query};
use bytes::Bytes;
use hyper::{HeaderMap, Uri};
use rand::Rng;

pub use api::ApiRequestHandler;
pub use event::EventHandler;
pub use http::HttpProxyHandler;
pub use meta::MetaHandler;
pub use rpc::{DirectRpcHandler, RpcHandler};
pub use web::WebHandler;

use crate::{
    core::router::RouteError,
    ports::{
        handler::HandlerError,
        registry::{Node, RegistryError, ServiceRecord},
        resolver::ResolveError,
        rpc_client::RpcError,
    },
};

/// Largest request body any handler buffers.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

impl From<RouteError> for HandlerError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Resolve(ResolveError::NotFound) => {
                HandlerError::NotFound("no service could be resolved".to_string())
            }
            RouteError::Resolve(e) => HandlerError::BadRequest(e.to_string()),
            RouteError::Registry(RegistryError::NotFound(name)) => {
                HandlerError::NotFound(format!("service not found: {name}"))
            }
            RouteError::Registry(e) => HandlerError::InternalError(e.to_string()),
        }
    }
}

impl From<RpcError> for HandlerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Backend { code, detail } => HandlerError::Backend {
                status: hyper::StatusCode::from_u16(code)
                    .unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR),
                detail,
            },
            RpcError::Transport(e) => HandlerError::BadGateway(e),
            RpcError::Codec(e) => HandlerError::InternalError(e),
        }
    }
}

/// Pick a random node across every version of the resolved service.
pub(crate) fn pick_node(services: &[ServiceRecord]) -> Option<&Node> {
    let nodes: Vec<&Node> = services.iter().flat_map(|s| s.nodes.iter()).collect();
    if nodes.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..nodes.len());
    nodes.get(index).copied()
}

pub(crate) fn require_node<'a>(
    name: &str,
    services: &'a [ServiceRecord],
) -> Result<&'a Node, HandlerError> {
    pick_node(services).ok_or_else(|| {
        HandlerError::BadGateway(format!("service {name} has no available nodes"))
    })
}

pub(crate) async fn read_body(body: AxumBody) -> Result<Bytes, HandlerError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| HandlerError::BadRequest(format!("failed to read request body: {e}")))
}

pub(crate) fn query_map(uri: &Uri) -> HashMap<String, String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(map)| map)
        .unwrap_or_default()
}

/// Flatten headers into a single value per name (last value wins).
pub(crate) fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Decode a JSON request payload; an empty body falls back to the query string.
pub(crate) fn json_payload(uri: &Uri, body: &[u8]) -> Result<serde_json::Value, HandlerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::to_value(query_map(uri)).unwrap_or_default());
    }
    serde_json::from_slice(body)
        .map_err(|e| HandlerError::BadRequest(format!("request body is not valid JSON: {e}")))
}

pub(crate) fn json_response(
    value: &serde_json::Value,
) -> Result<hyper::Response<AxumBody>, HandlerError> {
    hyper::Response::builder()
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(AxumBody::from(value.to_string()))
        .map_err(|e| HandlerError::InternalError(e.to_string()))
}
