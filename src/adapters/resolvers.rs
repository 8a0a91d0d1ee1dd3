//! Resolver strategies mapping an inbound request to a backend service.
//!
//! * [`HostResolver`]  - service named by the `Host` header.
//! * [`PathResolver`]  - service named by the first path segment.
//! * [`GrpcResolver`]  - `/package.Service/Method` gRPC paths.
//! * [`StackResolver`] - default; RPC style routes for `rpc`/`api`/`meta`
//!   handlers and proxy style routes for everything else.
use axum::body::Body as AxumBody;
use hyper::{Request, header};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ports::resolver::{Endpoint, ResolveError, Resolver, ResolverOptions};

static VERSION_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v[0-9]+$").expect("valid regex"));

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn request_host(req: &Request<AxumBody>) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

fn title(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Routes by the `Host` header: `greeter.example.com` → service `greeter.example.com`.
#[derive(Debug, Clone)]
pub struct HostResolver {
    opts: ResolverOptions,
}

impl HostResolver {
    pub fn new(opts: ResolverOptions) -> Self {
        Self { opts }
    }
}

impl Resolver for HostResolver {
    fn resolve(&self, req: &Request<AxumBody>) -> Result<Endpoint, ResolveError> {
        let host = request_host(req);
        if host.is_empty() {
            return Err(ResolveError::NotFound);
        }

        Ok(Endpoint {
            name: host.clone(),
            host,
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "host"
    }

    fn options(&self) -> &ResolverOptions {
        &self.opts
    }
}

/// Routes by the first path segment: `/greeter/hello` → `{namespace}.greeter`.
#[derive(Debug, Clone)]
pub struct PathResolver {
    opts: ResolverOptions,
}

impl PathResolver {
    pub fn new(opts: ResolverOptions) -> Self {
        Self { opts }
    }
}

impl Resolver for PathResolver {
    fn resolve(&self, req: &Request<AxumBody>) -> Result<Endpoint, ResolveError> {
        let path = req.uri().path();
        let first = segments(path).first().copied().ok_or(ResolveError::NotFound)?;

        Ok(Endpoint {
            name: self.opts.qualify(first),
            host: request_host(req),
            method: req.method().to_string(),
            path: path.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "path"
    }

    fn options(&self) -> &ResolverOptions {
        &self.opts
    }
}

/// Routes gRPC style paths: `/helloworld.Greeter/SayHello` → service
/// `helloworld.Greeter`, method `Greeter.SayHello`.
#[derive(Debug, Clone)]
pub struct GrpcResolver {
    opts: ResolverOptions,
}

impl GrpcResolver {
    pub fn new(opts: ResolverOptions) -> Self {
        Self { opts }
    }
}

impl Resolver for GrpcResolver {
    fn resolve(&self, req: &Request<AxumBody>) -> Result<Endpoint, ResolveError> {
        let path = req.uri().path();
        let parts = segments(path);
        let [service, method] = parts.as_slice() else {
            return Err(ResolveError::InvalidPath(path.to_string()));
        };
        let (service, method) = (*service, *method);

        let short_name = service.rsplit('.').next().unwrap_or(service);

        Ok(Endpoint {
            name: service.to_string(),
            host: request_host(req),
            method: format!("{short_name}.{method}"),
            path: path.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "grpc"
    }

    fn options(&self) -> &ResolverOptions {
        &self.opts
    }
}

/// Default resolver.
///
/// RPC style (`rpc`, `api`, `meta` handlers):
/// * `/foo` → `foo`, `Foo.Call`
/// * `/foo/bar` → `foo`, `Foo.Bar`
/// * `/foo/bar/baz` → `foo`, `Bar.Baz`
/// * `/foo/bar/baz/cat` → `foo.bar`, `Baz.Cat`
/// * a leading `/v1` style segment is folded into the service name
///
/// Proxy style (everything else): the first segment (plus version) names the
/// service and the method is the HTTP method.
#[derive(Debug, Clone)]
pub struct StackResolver {
    opts: ResolverOptions,
}

impl StackResolver {
    pub fn new(opts: ResolverOptions) -> Self {
        Self { opts }
    }

    fn rpc_style(&self) -> bool {
        matches!(self.opts.handler.as_str(), "rpc" | "api" | "meta" | "")
    }

    /// Fold a leading version segment into the next one: `[v1, foo, ..]` → `[v1.foo, ..]`.
    fn fold_version(parts: Vec<&str>) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(parts.len());
        let mut iter = parts.into_iter();
        match (iter.next(), iter.clone().next()) {
            (Some(first), Some(second)) if VERSION_SEGMENT.is_match(first) => {
                iter.next();
                out.push(format!("{first}.{second}"));
            }
            (Some(first), _) => out.push(first.to_string()),
            (None, _) => return out,
        }
        out.extend(iter.map(str::to_string));
        out
    }

    fn api_route(parts: &[String]) -> (String, String) {
        let head_title = |s: &str| title(s.rsplit('.').next().unwrap_or(s));
        match parts.len() {
            1 => (parts[0].clone(), format!("{}.Call", head_title(&parts[0]))),
            2 => (
                parts[0].clone(),
                format!("{}.{}", head_title(&parts[0]), title(&parts[1])),
            ),
            3 => (
                parts[0].clone(),
                format!("{}.{}", title(&parts[1]), title(&parts[2])),
            ),
            n => (
                parts[..n - 2].join("."),
                format!("{}.{}", title(&parts[n - 2]), title(&parts[n - 1])),
            ),
        }
    }
}

impl Resolver for StackResolver {
    fn resolve(&self, req: &Request<AxumBody>) -> Result<Endpoint, ResolveError> {
        let path = req.uri().path();
        let parts = Self::fold_version(segments(path));
        if parts.is_empty() {
            return Err(ResolveError::NotFound);
        }

        let (service, method) = if self.rpc_style() {
            Self::api_route(&parts)
        } else {
            (parts[0].clone(), req.method().to_string())
        };

        Ok(Endpoint {
            name: self.opts.qualify(&service),
            host: request_host(req),
            method,
            path: path.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "stack"
    }

    fn options(&self) -> &ResolverOptions {
        &self.opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request<AxumBody> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, "greeter.example.com")
            .body(AxumBody::empty())
            .unwrap()
    }

    fn opts(handler: &str) -> ResolverOptions {
        ResolverOptions::new("stack.rpc.api", handler)
    }

    #[test]
    fn test_host_resolver_uses_host_header() {
        let endpoint = HostResolver::new(opts("meta"))
            .resolve(&request("/anything"))
            .unwrap();
        assert_eq!(endpoint.name, "greeter.example.com");
        assert_eq!(endpoint.method, "GET");
    }

    #[test]
    fn test_path_resolver_takes_first_segment() {
        let resolver = PathResolver::new(opts("http"));
        let endpoint = resolver.resolve(&request("/greeter/say/hello")).unwrap();
        assert_eq!(endpoint.name, "stack.rpc.api.greeter");
        assert_eq!(endpoint.path, "/greeter/say/hello");

        assert_eq!(
            resolver.resolve(&request("/")).unwrap_err(),
            ResolveError::NotFound
        );
    }

    #[test]
    fn test_grpc_resolver_requires_service_and_method() {
        let resolver = GrpcResolver::new(opts("rpc"));
        let endpoint = resolver
            .resolve(&request("/helloworld.Greeter/SayHello"))
            .unwrap();
        assert_eq!(endpoint.name, "helloworld.Greeter");
        assert_eq!(endpoint.method, "Greeter.SayHello");

        assert!(matches!(
            resolver.resolve(&request("/helloworld.Greeter")),
            Err(ResolveError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_stack_resolver_rpc_routes() {
        let resolver = StackResolver::new(opts("rpc"));
        let cases = [
            ("/foo", "stack.rpc.api.foo", "Foo.Call"),
            ("/foo/bar", "stack.rpc.api.foo", "Foo.Bar"),
            ("/foo/bar/baz", "stack.rpc.api.foo", "Bar.Baz"),
            ("/foo/bar/baz/cat", "stack.rpc.api.foo.bar", "Baz.Cat"),
            ("/v1/foo", "stack.rpc.api.v1.foo", "Foo.Call"),
            ("/v1/foo/bar", "stack.rpc.api.v1.foo", "Foo.Bar"),
            ("/v2/foo/bar/baz", "stack.rpc.api.v2.foo", "Bar.Baz"),
        ];

        for (path, service, method) in cases {
            let endpoint = resolver.resolve(&request(path)).unwrap();
            assert_eq!(endpoint.name, service, "service for {path}");
            assert_eq!(endpoint.method, method, "method for {path}");
        }
    }

    #[test]
    fn test_stack_resolver_proxy_routes() {
        let resolver = StackResolver::new(opts("http"));
        let endpoint = resolver.resolve(&request("/foo/bar/baz")).unwrap();
        assert_eq!(endpoint.name, "stack.rpc.api.foo");
        assert_eq!(endpoint.method, "GET");

        let endpoint = resolver.resolve(&request("/v1/foo/bar")).unwrap();
        assert_eq!(endpoint.name, "stack.rpc.api.v1.foo");
    }
}
