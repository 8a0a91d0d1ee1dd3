use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{
    Request, Response, StatusCode,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};

use super::{query_map, read_body, require_node};
use crate::{
    core::{router::Router, service::Service},
    ports::{
        handler::{ApiHandler, HandlerError, HandlerKind},
        rpc_client::RpcRequest,
    },
};

/// Full HTTP request as seen by an `api` backend.
#[derive(Debug, Serialize)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub header: HashMap<String, Vec<String>>,
    pub get: HashMap<String, String>,
    pub body: String,
}

/// What an `api` backend answers with.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub header: HashMap<String, Vec<String>>,
    pub body: String,
}

/// Hands the whole HTTP request to the backend and lets it decide status,
/// headers and body of the response.
pub struct ApiRequestHandler {
    router: Arc<Router>,
    service: Arc<Service>,
}

impl ApiRequestHandler {
    pub fn new(router: Arc<Router>, service: Arc<Service>) -> Self {
        Self { router, service }
    }
}

fn to_api_request(parts: &hyper::http::request::Parts, body: &[u8]) -> ApiRequest {
    let mut header: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            header
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    ApiRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        header,
        get: query_map(&parts.uri),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

fn from_api_response(answer: ApiResponse) -> Result<Response<AxumBody>, HandlerError> {
    let status = match answer.status_code {
        0 => StatusCode::OK,
        code => StatusCode::from_u16(code)
            .map_err(|e| HandlerError::BadGateway(format!("backend returned bad status: {e}")))?,
    };

    let mut response = Response::builder().status(status);
    for (name, values) in &answer.header {
        let Ok(name) = HeaderName::try_from(name.as_str()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                response = response.header(name.clone(), value);
            }
        }
    }

    response
        .body(AxumBody::from(answer.body))
        .map_err(|e| HandlerError::InternalError(e.to_string()))
}

#[async_trait]
impl ApiHandler for ApiRequestHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Api
    }

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError> {
        let route = self.router.route(&req).await?;
        let node = require_node(&route.endpoint.name, &route.services)?;

        let (parts, body) = req.into_parts();
        let body = read_body(body).await?;
        let api_request = to_api_request(&parts, &body);
        let payload = serde_json::to_value(&api_request)
            .map_err(|e| HandlerError::InternalError(e.to_string()))?;

        let answer = self
            .service
            .client()
            .call(RpcRequest {
                service: route.endpoint.name,
                endpoint: route.endpoint.method,
                address: node.address.clone(),
                headers: HashMap::new(),
                body: payload,
            })
            .await?;

        let answer: ApiResponse = serde_json::from_value(answer)
            .map_err(|e| HandlerError::BadGateway(format!("invalid api response: {e}")))?;
        from_api_response(answer)
    }
}
