//! Gateway composition.
//!
//! [`Gateway::compose`] turns the configuration into a single request
//! handler in a fixed order: plugins are initialised, the transport is
//! bootstrapped, the fixed routes, `/stats`, `/rpc` and the selected handler
//! are mounted, the statistics layer wraps the router and the plugin chain
//! wraps everything.
use std::sync::Arc;

use crate::{
    adapters::{builtin_plugin, handlers::DirectRpcHandler},
    config::models::{GatewayConfig, PluginChainMode},
    core::{
        chain::{self, PluginRegistry},
        error::GatewayError,
        handler_selector::{MountPath, select_handler},
        routes,
        server::GatewayServer,
        service::Service,
        stats::Stats,
        transport::{TransportMode, bootstrap_transport},
    },
    ports::{
        handler::{BoxHandler, HandlerKind, into_service},
        plugin::Plugin,
    },
};

/// Output of [`Gateway::compose`]: everything needed to start a server.
pub struct ComposedGateway {
    pub transport: TransportMode,
    pub handler: BoxHandler,
    pub stats: Option<Arc<Stats>>,
    pub kind: HandlerKind,
    pub mount: MountPath,
    /// Names of the plugins in the chain, outermost first.
    pub plugins: Vec<String>,
}

pub struct Gateway {
    config: Arc<GatewayConfig>,
    service: Arc<Service>,
    registry: Arc<PluginRegistry>,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl Gateway {
    pub fn new(config: Arc<GatewayConfig>, service: Arc<Service>) -> Self {
        Self {
            config,
            service,
            registry: chain::global_registry(),
            plugins: Vec::new(),
        }
    }

    /// Take shared plugins from `registry` instead of the process-wide one.
    pub fn with_plugin_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Attach a plugin to this gateway only. Local plugins run inside the
    /// registry plugins, in the order they were attached.
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    /// Built-ins named in the configuration, then programmatic plugins.
    fn local_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        let mut plugins = Vec::with_capacity(self.config.plugins.len() + self.plugins.len());
        for name in &self.config.plugins {
            match builtin_plugin(name) {
                Some(plugin) => plugins.push(plugin),
                None => tracing::warn!(plugin = %name, "unknown plugin, skipping"),
            }
        }
        plugins.extend(self.plugins.iter().cloned());
        plugins
    }

    /// Reject mount paths axum would refuse or that shadow another route.
    fn check_mounts(&self) -> Result<(), GatewayError> {
        let config = &self.config;
        match routes::mount_path_problems(config).into_iter().next() {
            Some((field, reason)) => Err(GatewayError::HandlerConstruction {
                handler: if field == "rpc_path" {
                    "rpc".to_string()
                } else {
                    config.handler.clone()
                },
                reason: format!("{field} {reason}"),
            }),
            None => Ok(()),
        }
    }

    /// Build the full request pipeline. Fails before any handler is built
    /// when plugins, the transport or the mount paths cannot be set up.
    pub fn compose(&self) -> Result<ComposedGateway, GatewayError> {
        let config = &self.config;

        let unique = chain::effective_plugins(
            &self.registry.snapshot(),
            &self.local_plugins(),
            PluginChainMode::Single,
        );
        for plugin in &unique {
            plugin.init(config).map_err(|e| GatewayError::PluginInit {
                name: plugin.name().to_string(),
                reason: e.to_string(),
            })?;
        }
        let plugins = match config.plugin_chain {
            PluginChainMode::Single => unique,
            mode => chain::effective_plugins(&unique, &[], mode),
        };

        let transport = bootstrap_transport(config)?;
        self.check_mounts()?;

        let mut router = routes::base_router(&config.version);

        let stats = config.enable_stats.then(Stats::new);
        if let Some(stats) = &stats {
            tracing::info!(path = routes::STATS_PATH, "registering stats handler");
            router = routes::mount_stats(router, stats.clone());
        }

        if config.enable_rpc {
            tracing::info!(handler = "rpc", path = %config.rpc_path, "registering handler");
            let rpc = into_service(Arc::new(DirectRpcHandler::new(self.service.clone())));
            router = routes::mount_prefix(router, &config.rpc_path, rpc);
        }

        let selection = select_handler(&config.handler, config, &self.service)?;
        let (kind, mount) = (selection.kind, selection.mount.clone());
        router = routes::mount(router, selection);

        let mut handler: BoxHandler = BoxHandler::new(router);
        if let Some(stats) = &stats {
            handler = stats.wrap(handler);
        }
        let handler = chain::wrap(handler, &plugins);

        Ok(ComposedGateway {
            transport,
            handler,
            stats,
            kind,
            mount,
            plugins: plugins.iter().map(|p| p.name().to_string()).collect(),
        })
    }

    /// Compose, bind and register the listener's shutdown with the owning
    /// service. The returned server is already accepting connections.
    pub async fn run(&self) -> Result<Arc<GatewayServer>, GatewayError> {
        let composed = self.compose()?;

        let mut server = GatewayServer::new(self.config.address.clone())
            .with_transport(composed.transport)
            .with_shutdown_timeout(self.config.shutdown_timeout());
        if let Some(stats) = &composed.stats {
            stats.start();
            server = server.with_stats(stats.clone());
        }
        let server = Arc::new(server);

        if let Err(e) = server.start(composed.handler).await {
            if let Some(stats) = &composed.stats {
                stats.stop().await;
            }
            return Err(e);
        }
        server.register_shutdown_hook(self.service.lifecycle());

        tracing::info!(
            server = %self.config.server_name,
            handler = %composed.kind,
            path = %composed.mount,
            plugins = ?composed.plugins,
            "gateway started"
        );
        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body as AxumBody;
    use http_body_util::BodyExt;
    use hyper::{Method, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::handlers::test_support::fixture;

    fn config() -> GatewayConfig {
        GatewayConfig {
            version: "9.9.9".to_string(),
            ..Default::default()
        }
    }

    async fn call(handler: &BoxHandler, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(AxumBody::from(body.to_string()))
            .unwrap();
        let response = handler.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_default_composition_is_meta_on_root() {
        let fx = fixture().await;
        let composed = Gateway::new(Arc::new(config()), fx.service.clone())
            .compose()
            .unwrap();

        assert_eq!(composed.kind, HandlerKind::Meta);
        assert_eq!(composed.mount, MountPath::Prefix("/".to_string()));
        assert!(matches!(composed.transport, TransportMode::Plain));
        assert!(composed.stats.is_none());

        let (status, body) = call(&composed.handler, Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("9.9.9"));

        let (status, body) = call(&composed.handler, Method::GET, "/greeter/hello", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Greeter.Hello"));
    }

    #[tokio::test]
    async fn test_rpc_is_mounted_next_to_primary_handler() {
        let fx = fixture().await;
        let config = GatewayConfig {
            handler: "api".to_string(),
            enable_rpc: true,
            ..config()
        };
        let composed = Gateway::new(Arc::new(config), fx.service.clone())
            .compose()
            .unwrap();
        assert_eq!(composed.kind, HandlerKind::Api);

        let (status, body) = call(
            &composed.handler,
            Method::POST,
            "/rpc",
            r#"{"service":"stack.rpc.api.greeter","endpoint":"Greeter.Hello"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body.contains("Greeter.Hello"));

        let (status, _) = call(&composed.handler, Method::POST, "/greeter/hello", "{}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fx.rpc.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stats_counts_every_request() {
        let fx = fixture().await;
        let config = GatewayConfig {
            enable_stats: true,
            ..config()
        };
        let composed = Gateway::new(Arc::new(config), fx.service.clone())
            .compose()
            .unwrap();

        call(&composed.handler, Method::GET, "/favicon.ico", "").await;
        call(&composed.handler, Method::GET, "/nobody", "").await;

        let (status, body) = call(&composed.handler, Method::GET, "/stats", "").await;
        assert_eq!(status, StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["requests"], 2);
        assert_eq!(value["status"]["4xx"], 1);
    }

    #[tokio::test]
    async fn test_configured_plugins_wrap_the_router() {
        let fx = fixture().await;
        let config = GatewayConfig {
            plugins: vec!["security_headers".to_string(), "no_such_plugin".to_string()],
            ..config()
        };
        let composed = Gateway::new(Arc::new(config), fx.service.clone())
            .compose()
            .unwrap();
        assert!(composed.plugins.contains(&"security_headers".to_string()));
        assert!(!composed.plugins.contains(&"no_such_plugin".to_string()));

        let req = Request::builder().uri("/").body(AxumBody::empty()).unwrap();
        let response = composed.handler.oneshot(req).await.unwrap();
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_bad_acme_provider_fails_before_handlers() {
        let fx = fixture().await;
        let config = GatewayConfig {
            enable_acme: true,
            acme_provider: "lego".to_string(),
            acme_hosts: vec!["api.example.com".to_string()],
            ..config()
        };
        let err = Gateway::new(Arc::new(config), fx.service.clone())
            .compose()
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::UnknownAcmeProvider(_)));
    }

    async fn compose_error(config: GatewayConfig) -> GatewayError {
        let fx = fixture().await;
        Gateway::new(Arc::new(config), fx.service.clone())
            .compose()
            .err()
            .unwrap()
    }

    #[tokio::test]
    async fn test_api_path_colliding_with_rpc_is_rejected() {
        let err = compose_error(GatewayConfig {
            handler: "rpc".to_string(),
            enable_rpc: true,
            api_path: "/rpc".to_string(),
            ..config()
        })
        .await;
        assert!(matches!(
            err,
            GatewayError::HandlerConstruction { handler, .. } if handler == "rpc"
        ));
    }

    #[tokio::test]
    async fn test_rpc_path_on_builtin_route_is_an_error() {
        let err = compose_error(GatewayConfig {
            enable_rpc: true,
            enable_stats: true,
            rpc_path: "/stats".to_string(),
            ..config()
        })
        .await;
        match err {
            GatewayError::HandlerConstruction { handler, reason } => {
                assert_eq!(handler, "rpc");
                assert!(reason.contains("/stats"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = compose_error(GatewayConfig {
            enable_rpc: true,
            rpc_path: "/favicon.ico".to_string(),
            ..config()
        })
        .await;
        assert!(matches!(err, GatewayError::HandlerConstruction { .. }));
    }

    #[tokio::test]
    async fn test_route_metacharacters_in_paths_are_errors() {
        let err = compose_error(GatewayConfig {
            handler: "api".to_string(),
            api_path: "/api/{x".to_string(),
            ..config()
        })
        .await;
        match err {
            GatewayError::HandlerConstruction { handler, reason } => {
                assert_eq!(handler, "api");
                assert!(reason.starts_with("api_path"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = compose_error(GatewayConfig {
            enable_rpc: true,
            rpc_path: "/rpc/*".to_string(),
            ..config()
        })
        .await;
        assert!(matches!(
            err,
            GatewayError::HandlerConstruction { handler, .. } if handler == "rpc"
        ));
    }

    #[tokio::test]
    async fn test_stats_path_is_free_for_rpc_when_stats_are_off() {
        let fx = fixture().await;
        let config = GatewayConfig {
            enable_rpc: true,
            rpc_path: "/stats".to_string(),
            ..config()
        };
        let composed = Gateway::new(Arc::new(config), fx.service.clone())
            .compose()
            .unwrap();
        let (status, body) = call(
            &composed.handler,
            Method::POST,
            "/stats",
            r#"{"service":"stack.rpc.api.greeter","endpoint":"Greeter.Hello"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    #[tokio::test]
    async fn test_run_binds_and_stops_with_lifecycle() {
        let fx = fixture().await;
        let config = GatewayConfig {
            address: "127.0.0.1:0".to_string(),
            enable_stats: true,
            ..config()
        };
        let server = Gateway::new(Arc::new(config), fx.service.clone())
            .run()
            .await
            .unwrap();
        assert!(server.local_addr().is_some());

        fx.service.lifecycle().stop().await.unwrap();
        assert!(server.is_stopped());
    }
}
