//! Built-in plugins that can be enabled by name through the `plugins`
//! configuration option.
//!
//! Each plugin is a thin wrapper around an axum `from_fn` middleware (or a
//! tower-http layer) boxed back into the pipeline's [`BoxHandler`] shape, so
//! built-ins and programmatically registered plugins compose the same way.
use std::{
    sync::{Arc, OnceLock},
    time::Instant,
};

use axum::{
    body::Body as AxumBody,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
};
use eyre::{Result, WrapErr};
use tower::{Layer, ServiceExt, util::BoxCloneSyncService};
use tower_http::compression::CompressionLayer;
use tracing::Instrument;

use crate::{
    config::models::GatewayConfig,
    ports::{handler::BoxHandler, plugin::Plugin},
    tracing_setup::create_request_span,
    utils::write_cors_headers,
};

/// Look up a built-in plugin by its configuration name.
pub fn builtin_plugin(name: &str) -> Option<Arc<dyn Plugin>> {
    let plugin: Arc<dyn Plugin> = match name {
        "cors" => Arc::new(CorsPlugin),
        "request_id" => Arc::new(RequestIdPlugin::default()),
        "security_headers" => Arc::new(SecurityHeadersPlugin),
        "timing" => Arc::new(TimingPlugin),
        "compression" => Arc::new(CompressionPlugin),
        _ => return None,
    };
    Some(plugin)
}

/// Answers preflight requests directly and adds CORS headers to every other
/// response.
pub struct CorsPlugin;

async fn cors(req: Request, next: Next) -> Response {
    let origin = req.headers().get(hyper::header::ORIGIN).cloned();

    let mut response = if req.method() == Method::OPTIONS {
        Response::new(AxumBody::empty())
    } else {
        next.run(req).await
    };
    write_cors_headers(origin.as_ref(), response.headers_mut());
    response
}

impl Plugin for CorsPlugin {
    fn name(&self) -> &str {
        "cors"
    }

    fn wrap(&self, inner: BoxHandler) -> BoxHandler {
        BoxCloneSyncService::new(middleware::from_fn(cors).layer(inner))
    }
}

/// Tags every request with an id, reusing the one the caller sent if any.
///
/// The header is `{header_prefix}Request-Id`; until `init` runs it falls
/// back to `x-request-id`.
#[derive(Default)]
pub struct RequestIdPlugin {
    header: OnceLock<HeaderName>,
}

impl RequestIdPlugin {
    fn header(&self) -> HeaderName {
        self.header
            .get()
            .cloned()
            .unwrap_or_else(|| HeaderName::from_static("x-request-id"))
    }
}

async fn request_id(State(header): State<HeaderName>, mut req: Request, next: Next) -> Response {
    let id = match req.headers().get(&header) {
        Some(value) => value.clone(),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            match HeaderValue::from_str(&id) {
                Ok(value) => value,
                Err(_) => return next.run(req).await,
            }
        }
    };
    req.headers_mut().insert(header.clone(), id.clone());

    let span = create_request_span(
        req.method().as_str(),
        req.uri().path(),
        id.to_str().unwrap_or_default(),
    );
    let mut response = next.run(req).instrument(span.clone()).await;
    span.record("http.status_code", response.status().as_u16());
    response.headers_mut().insert(header, id);
    response
}

impl Plugin for RequestIdPlugin {
    fn name(&self) -> &str {
        "request_id"
    }

    fn init(&self, config: &GatewayConfig) -> Result<()> {
        let name = format!("{}Request-Id", config.header_prefix).to_ascii_lowercase();
        let header = HeaderName::try_from(name.as_str())
            .wrap_err_with(|| format!("invalid request id header {name}"))?;
        // A second init keeps the first header.
        let _ = self.header.set(header);
        Ok(())
    }

    fn wrap(&self, inner: BoxHandler) -> BoxHandler {
        BoxCloneSyncService::new(
            middleware::from_fn_with_state(self.header(), request_id).layer(inner),
        )
    }
}

/// Adds common hardening headers to every response.
pub struct SecurityHeadersPlugin;

async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

impl Plugin for SecurityHeadersPlugin {
    fn name(&self) -> &str {
        "security_headers"
    }

    fn wrap(&self, inner: BoxHandler) -> BoxHandler {
        BoxCloneSyncService::new(middleware::from_fn(security_headers).layer(inner))
    }
}

/// Logs method, path, status and latency of every request.
pub struct TimingPlugin;

async fn timing(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let status: StatusCode = response.status();

    tracing::info!(
        %method,
        %path,
        status = status.as_u16(),
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        "request completed"
    );
    response
}

impl Plugin for TimingPlugin {
    fn name(&self) -> &str {
        "timing"
    }

    fn wrap(&self, inner: BoxHandler) -> BoxHandler {
        BoxCloneSyncService::new(middleware::from_fn(timing).layer(inner))
    }
}

/// Compresses response bodies according to the caller's `Accept-Encoding`.
pub struct CompressionPlugin;

impl Plugin for CompressionPlugin {
    fn name(&self) -> &str {
        "compression"
    }

    fn wrap(&self, inner: BoxHandler) -> BoxHandler {
        let compressed = ServiceExt::<Request>::map_response(
            CompressionLayer::new().layer(inner),
            |response| response.map(AxumBody::new),
        );
        BoxCloneSyncService::new(compressed)
    }
}
