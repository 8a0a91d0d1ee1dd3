use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http_body_util::BodyExt;
use hyper::{
    Request,
    header::{self, HeaderName, HeaderValue},
};

use crate::ports::{
    http_client::HttpClient,
    rpc_client::{RpcClient, RpcError, RpcRequest},
};

/// Headers describing the original body or connection; the client sets its own.
static SKIPPED_HEADERS: [HeaderName; 5] = [
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::HOST,
];

/// JSON over HTTP RPC transport.
///
/// Each call is a `POST {path}` to the chosen node with the JSON request as
/// body; the target service and endpoint travel in `{prefix}Service` and
/// `{prefix}Endpoint` headers.
pub struct HttpRpcClient {
    http_client: Arc<dyn HttpClient>,
    service_header: HeaderName,
    endpoint_header: HeaderName,
    path: String,
}

impl HttpRpcClient {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        header_prefix: &str,
        path: impl Into<String>,
    ) -> eyre::Result<Self> {
        Ok(Self {
            http_client,
            service_header: HeaderName::try_from(format!("{header_prefix}Service"))?,
            endpoint_header: HeaderName::try_from(format!("{header_prefix}Endpoint"))?,
            path: path.into(),
        })
    }

    fn build_request(&self, request: &RpcRequest) -> Result<Request<AxumBody>, RpcError> {
        let body =
            serde_json::to_vec(&request.body).map_err(|e| RpcError::Codec(e.to_string()))?;

        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("http://{}{}", request.address, self.path))
            .header(header::CONTENT_TYPE, "application/json")
            .header(&self.service_header, request.service.as_str())
            .header(&self.endpoint_header, request.endpoint.as_str());

        for (name, value) in &request.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_str(value),
            ) {
                if SKIPPED_HEADERS.contains(&name) {
                    continue;
                }
                builder = builder.header(name, value);
            }
        }

        builder
            .body(AxumBody::from(body))
            .map_err(|e| RpcError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError> {
        let http_request = self.build_request(&request)?;

        tracing::debug!(
            service = %request.service,
            endpoint = %request.endpoint,
            address = %request.address,
            "rpc call"
        );

        let response = self
            .http_client
            .send_request(http_request)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            return Err(RpcError::Backend {
                code: status.as_u16(),
                detail: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }

        serde_json::from_slice(&bytes).map_err(|e| RpcError::Codec(e.to_string()))
    }
}
