use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response, header};
use once_cell::sync::Lazy;
use regex::Regex;

use super::require_node;
use crate::{
    core::{router::Router, service::Service},
    ports::{
        handler::{ApiHandler, HandlerError, HandlerKind},
        http_client::HttpClientError,
    },
};

/// Service names accepted in the first path segment of a proxied request.
static SERVICE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("valid regex"));

/// Headers that only apply to a single connection and are not forwarded.
static HOP_BY_HOP: [header::HeaderName; 5] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::UPGRADE,
];

/// Send `req` to `address`, rewriting its URI to `path_and_query`.
pub(crate) async fn forward(
    service: &Service,
    address: &str,
    path_and_query: &str,
    req: Request<AxumBody>,
) -> Result<Response<AxumBody>, HandlerError> {
    let (mut parts, body) = req.into_parts();
    parts.uri = format!("http://{address}{path_and_query}")
        .parse()
        .map_err(|e| HandlerError::BadRequest(format!("invalid backend uri: {e}")))?;
    for name in &HOP_BY_HOP {
        parts.headers.remove(name);
    }

    service
        .http_client()
        .send_request(Request::from_parts(parts, body))
        .await
        .map_err(|e| match e {
            HttpClientError::InvalidRequest(e) => HandlerError::BadRequest(e),
            e => HandlerError::BadGateway(e.to_string()),
        })
}

/// Reverse proxy to a node of the service named by the first path segment.
/// The path is forwarded unchanged.
pub struct HttpProxyHandler {
    router: Arc<Router>,
    service: Arc<Service>,
}

impl HttpProxyHandler {
    pub fn new(router: Arc<Router>, service: Arc<Service>) -> Self {
        Self { router, service }
    }
}

#[async_trait]
impl ApiHandler for HttpProxyHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Http
    }

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        let segment = req
            .uri()
            .path()
            .split('/')
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        if !SERVICE_SEGMENT.is_match(segment) {
            return Err(HandlerError::NotFound(format!(
                "no service matches {}",
                req.uri().path()
            )));
        }

        let route = self.router.route(&req).await?;
        let node = require_node(&route.endpoint.name, &route.services)?;
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        forward(&self.service, &node.address, &path_and_query, req).await
    }
}
