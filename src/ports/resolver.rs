use axum::body::Body as AxumBody;
use hyper::Request;
use thiserror::Error;

/// Target of an inbound request as decided by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Fully qualified service name, namespace included.
    pub name: String,
    pub host: String,
    /// Backend method (`Greeter.Hello`) or the HTTP method for proxy style routes.
    pub method: String,
    pub path: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("no service could be resolved from the request")]
    NotFound,

    #[error("invalid request path: {0}")]
    InvalidPath(String),
}

/// Parameters every resolver is constructed with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    pub namespace: String,
    /// Name of the configured handler strategy; some resolvers map paths
    /// differently for RPC style and proxy style handlers.
    pub handler: String,
}

impl ResolverOptions {
    pub fn new(namespace: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            handler: handler.into(),
        }
    }

    /// Prefix `service` with the namespace unless it is already qualified.
    pub fn qualify(&self, service: &str) -> String {
        if self.namespace.is_empty() || service.starts_with(&format!("{}.", self.namespace)) {
            service.to_string()
        } else {
            format!("{}.{}", self.namespace, service)
        }
    }
}

/// Maps an inbound request to a backend service. Implementations are
/// immutable and shared across every request.
pub trait Resolver: Send + Sync + 'static {
    fn resolve(&self, req: &Request<AxumBody>) -> Result<Endpoint, ResolveError>;

    /// Short strategy name (`host`, `path`, `grpc`, `stack`).
    fn name(&self) -> &'static str;

    fn options(&self) -> &ResolverOptions;
}
