//! Resolver selection by configured name.
use std::sync::Arc;

use crate::{
    adapters::resolvers::{GrpcResolver, HostResolver, PathResolver, StackResolver},
    ports::resolver::{Resolver, ResolverOptions},
};

type ResolverFactory = fn(ResolverOptions) -> Arc<dyn Resolver>;

const RESOLVERS: &[(&str, ResolverFactory)] = &[
    ("host", host_resolver),
    ("path", path_resolver),
    ("grpc", grpc_resolver),
];

fn host_resolver(opts: ResolverOptions) -> Arc<dyn Resolver> {
    Arc::new(HostResolver::new(opts))
}

fn path_resolver(opts: ResolverOptions) -> Arc<dyn Resolver> {
    Arc::new(PathResolver::new(opts))
}

fn grpc_resolver(opts: ResolverOptions) -> Arc<dyn Resolver> {
    Arc::new(GrpcResolver::new(opts))
}

fn default_resolver(opts: ResolverOptions) -> Arc<dyn Resolver> {
    Arc::new(StackResolver::new(opts))
}

/// Pick the resolver strategy named `name`. Any name that is not a known
/// strategy, including the empty string, selects the stack resolver.
pub fn select_resolver(name: &str, opts: ResolverOptions) -> Arc<dyn Resolver> {
    let factory = RESOLVERS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, factory)| *factory);

    match factory {
        Some(factory) => factory(opts),
        None => {
            if !name.is_empty() && name != "stack" {
                tracing::warn!(resolver = %name, "unknown resolver, using stack resolver");
            }
            default_resolver(opts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ResolverOptions {
        ResolverOptions::new("stack.rpc.api", "meta")
    }

    #[test]
    fn test_known_names_select_their_strategy() {
        for name in ["host", "path", "grpc"] {
            assert_eq!(select_resolver(name, opts()).name(), name);
        }
    }

    #[test]
    fn test_anything_else_selects_stack() {
        for name in ["stack", "", "HOST", "micro", "unknown"] {
            assert_eq!(select_resolver(name, opts()).name(), "stack");
        }
    }

    #[test]
    fn test_options_are_passed_through() {
        let resolver = select_resolver("path", ResolverOptions::new("acme.api", "rpc"));
        assert_eq!(resolver.options().namespace, "acme.api");
        assert_eq!(resolver.options().handler, "rpc");
    }
}
