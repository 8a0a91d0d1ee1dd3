use std::{convert::Infallible, fmt, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Body as AxumBody,
    http::{StatusCode, header},
    response::IntoResponse,
};
use hyper::{Request, Response};
use thiserror::Error;
use tower::{service_fn, util::BoxCloneSyncService};

/// The one handler shape every layer of the pipeline agrees on: a cloneable,
/// thread-safe service from request to response that never fails.
pub type BoxHandler = BoxCloneSyncService<Request<AxumBody>, Response<AxumBody>, Infallible>;

/// Closed set of handler strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Rpc,
    Api,
    Event,
    Http,
    Web,
    Meta,
}

impl HandlerKind {
    /// Exact-match lookup; `proxy` is an alias of `http`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rpc" => Some(Self::Rpc),
            "api" => Some(Self::Api),
            "event" => Some(Self::Event),
            "http" | "proxy" => Some(Self::Http),
            "web" => Some(Self::Web),
            "meta" => Some(Self::Meta),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Api => "api",
            Self::Event => "event",
            Self::Http => "http",
            Self::Web => "web",
            Self::Meta => "meta",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for handler strategies. Rendered as a JSON error body.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandlerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    InternalError(String),
    #[error("{detail}")]
    Backend { status: StatusCode, detail: String },
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend { status, .. } => *status,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = serde_json::json!({
            "id": "stack.rpc.gateway",
            "code": status.as_u16(),
            "detail": self.to_string(),
            "status": status.canonical_reason().unwrap_or("Unknown"),
        });

        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

/// A handler strategy: turns a routed request into a response.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    fn kind(&self) -> HandlerKind;

    async fn serve(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>, HandlerError>;
}

/// Adapt a handler strategy into the pipeline's [`BoxHandler`] shape.
pub fn into_service(handler: Arc<dyn ApiHandler>) -> BoxHandler {
    BoxCloneSyncService::new(service_fn(move |req: Request<AxumBody>| {
        let handler = handler.clone();
        async move {
            let response = match handler.serve(req).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(handler = %handler.kind(), error = %e, "handler returned error");
                    e.into_response()
                }
            };
            Ok::<_, Infallible>(response)
        }
    }))
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn test_handler_kind_names() {
        for name in ["rpc", "api", "event", "http", "web", "meta"] {
            assert_eq!(HandlerKind::from_name(name).unwrap().as_str(), name);
        }
        assert_eq!(HandlerKind::from_name("proxy"), Some(HandlerKind::Http));
        assert_eq!(HandlerKind::from_name("grpc"), None);
    }

    #[tokio::test]
    async fn test_handler_error_renders_json() {
        let response = HandlerError::NotFound("service not found: foo".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], 404);
        assert_eq!(value["detail"], "service not found: foo");
    }
}
