use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};

use super::{http::forward, require_node};
use crate::{
    core::{router::Router, service::Service},
    ports::handler::{ApiHandler, HandlerError, HandlerKind},
};

/// Like the HTTP proxy, but the service segment is stripped before the
/// request reaches the backend: `/blog/posts/1` is served as `/posts/1` by
/// the `blog` web app.
pub struct WebHandler {
    router: Arc<Router>,
    service: Arc<Service>,
}

impl WebHandler {
    pub fn new(router: Arc<Router>, service: Arc<Service>) -> Self {
        Self { router, service }
    }
}

fn strip_first_segment(path: &str, query: Option<&str>) -> String {
    let rest = path
        .trim_start_matches('/')
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or_default();
    match query {
        Some(q) => format!("/{rest}?{q}"),
        None => format!("/{rest}"),
    }
}

#[async_trait]
impl ApiHandler for WebHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Web
    }

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        let route = self.router.route(&req).await?;
        let node = require_node(&route.endpoint.name, &route.services)?;
        let target = strip_first_segment(req.uri().path(), req.uri().query());

        forward(&self.service, &node.address, &target, req).await
    }
}
