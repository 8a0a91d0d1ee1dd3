//! Fixed routes and handler mounting on the gateway router.
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::Request,
    http::{Method, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};

use crate::{
    config::models::GatewayConfig,
    core::{
        handler_selector::{HandlerSelection, MountPath, PROXY_MOUNT},
        stats::Stats,
    },
    ports::handler::{BoxHandler, HandlerKind},
    utils::write_cors_headers,
};

pub const FAVICON_PATH: &str = "/favicon.ico";
pub const STATS_PATH: &str = "/stats";

/// Router with `/` and `/favicon.ico`.
///
/// `/` answers preflight requests with an empty 200 and everything else with
/// the gateway version; both carry CORS headers.
pub fn base_router(version: &str) -> Router {
    let version: Arc<str> = Arc::from(version);
    Router::new()
        .route(
            "/",
            any(move |req: Request| {
                let version = version.clone();
                async move { root(req, &version) }
            }),
        )
        .route(FAVICON_PATH, any(|| async { AxumBody::empty() }))
}

fn root(req: Request, version: &str) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();
    let mut response = if req.method() == Method::OPTIONS {
        Response::new(AxumBody::empty())
    } else {
        Json(serde_json::json!({ "version": version })).into_response()
    };
    write_cors_headers(origin.as_ref(), response.headers_mut());
    response
}

/// Add the `/stats` snapshot route.
pub fn mount_stats(router: Router, stats: Arc<Stats>) -> Router {
    router.route(
        STATS_PATH,
        get(move || {
            let stats = stats.clone();
            async move { Json(stats.snapshot()) }
        }),
    )
}

/// Mount `handler` on `path` and everything below it.
///
/// `/` becomes the fallback so the fixed routes keep precedence.
pub fn mount_prefix(router: Router, path: &str, handler: BoxHandler) -> Router {
    let prefix = path.trim_end_matches('/');
    if prefix.is_empty() {
        return router.fallback_service(handler);
    }
    router
        .route_service(prefix, handler.clone())
        .route_service(&format!("{prefix}/{{*rest}}"), handler)
}

/// Why `path` cannot be used as a literal mount prefix, if it cannot.
fn prefix_syntax_problem(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return Some("must start with '/'".to_string());
    }
    if let Some(c) = path.chars().find(|c| matches!(c, '{' | '}' | '*')) {
        return Some(format!("must not contain the route metacharacter '{c}'"));
    }
    if path.split('/').any(|segment| segment.starts_with(':')) {
        return Some("path segments must not start with ':'".to_string());
    }
    None
}

fn same_prefix(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Every reason the configured `api_path` and `rpc_path` cannot be mounted
/// next to the fixed routes, as `(field, reason)` pairs. Empty when
/// composition can mount both.
///
/// `rpc_path` only competes for a route when `enable_rpc` is set, and
/// `api_path` is not mounted at all by the `http` handler.
pub fn mount_path_problems(config: &GatewayConfig) -> Vec<(&'static str, String)> {
    let mut problems = Vec::new();
    for (field, path) in [("api_path", &config.api_path), ("rpc_path", &config.rpc_path)] {
        if let Some(reason) = prefix_syntax_problem(path) {
            problems.push((field, format!("{path:?} {reason}")));
        }
    }

    let mut taken = vec![FAVICON_PATH];
    if config.enable_stats {
        taken.push(STATS_PATH);
    }
    if config.enable_rpc {
        if let Some(route) = taken.iter().find(|r| same_prefix(&config.rpc_path, r)) {
            problems.push((
                "rpc_path",
                format!("{:?} collides with the built-in route {route}", config.rpc_path),
            ));
        }
        taken.push(config.rpc_path.as_str());
    }

    if HandlerKind::from_name(&config.handler) != Some(HandlerKind::Http) {
        if let Some(route) = taken.iter().find(|r| same_prefix(&config.api_path, r)) {
            problems.push((
                "api_path",
                format!("{:?} collides with the route {route}", config.api_path),
            ));
        }
    }
    problems
}

/// Mount the handler chosen by the handler selector.
pub fn mount(router: Router, selection: HandlerSelection) -> Router {
    match selection.mount {
        MountPath::Prefix(path) => mount_prefix(router, &path, selection.handler),
        MountPath::Proxy => router
            .route_service(PROXY_MOUNT, selection.handler.clone())
            .route_service(&format!("{PROXY_MOUNT}/{{*rest}}"), selection.handler),
    }
}
