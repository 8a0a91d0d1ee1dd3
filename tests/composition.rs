// End-to-end composition tests: a real backend on loopback, the real HTTP and
// RPC clients, and the composed gateway handler driven in-process.
#[cfg(test)]
mod test {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use axum::{Json, body::Body as AxumBody, extract::Request, routing::any};
    use http_body_util::BodyExt;
    use hyper::{Method, StatusCode, header};
    use stack_gateway::{
        Gateway, GatewayConfig, HttpClientAdapter, Plugin, Service,
        adapters::{HttpRpcClient, MemoryBroker, MemoryRegistry},
        config::PluginChainMode,
        core::chain::PluginRegistry,
        ports::{
            handler::BoxHandler,
            http_client::HttpClient,
            registry::{Node, ServiceRecord},
        },
    };
    use tower::{ServiceExt, service_fn, util::BoxCloneSyncService};

    /// Backend answering every request with its method, path and selected headers.
    async fn spawn_backend() -> SocketAddr {
        let app = axum::Router::new().fallback(any(|req: Request| async move {
            let service = req
                .headers()
                .get("x-stack-service")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = req.into_body().collect().await.unwrap().to_bytes();
            Json(serde_json::json!({
                "service": service,
                "body": String::from_utf8_lossy(&body),
            }))
        }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn service_with_backend(addr: SocketAddr) -> Arc<Service> {
        let record = ServiceRecord {
            name: "stack.rpc.api.greeter".to_string(),
            version: "1.0.0".to_string(),
            metadata: Default::default(),
            endpoints: vec!["Greeter.Hello".to_string()],
            nodes: vec![Node {
                id: "greeter-1".to_string(),
                address: addr.to_string(),
                metadata: Default::default(),
            }],
        };
        let http: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new().unwrap());
        Arc::new(Service::new(
            "stack.rpc.gateway",
            "test",
            Arc::new(MemoryRegistry::with_services([record]).await),
            Arc::new(HttpRpcClient::new(http.clone(), "X-Stack-", "/").unwrap()),
            Arc::new(MemoryBroker::default()),
            http,
        ))
    }

    async fn call(handler: &BoxHandler, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        let req = hyper::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "gateway.local")
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(body.to_string()))
            .unwrap();
        let response = handler.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fixed_routes_and_unknown_handler_fallback() {
        let service = service_with_backend(spawn_backend().await).await;
        let config = GatewayConfig {
            version: "2.0.0".to_string(),
            handler: "graphql".to_string(),
            ..Default::default()
        };
        let composed = Gateway::new(Arc::new(config), service).compose().unwrap();

        let (status, body) = call(&composed.handler, Method::GET, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("2.0.0"));

        let (status, body) = call(&composed.handler, Method::OPTIONS, "/", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let (status, body) = call(&composed.handler, Method::GET, "/favicon.ico", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        // unknown handler names fall back to meta
        let (status, body) = call(&composed.handler, Method::GET, "/greeter/hello", "").await;
        assert_eq!(status, StatusCode::OK);
        let meta: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(meta["service"], "stack.rpc.api.greeter");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_proxy_reaches_backend() {
        let service = service_with_backend(spawn_backend().await).await;
        let config = GatewayConfig {
            handler: "http".to_string(),
            ..Default::default()
        };
        let composed = Gateway::new(Arc::new(config), service).compose().unwrap();

        let (status, body) =
            call(&composed.handler, Method::POST, "/greeter/say/hello", "ping").await;
        assert_eq!(status, StatusCode::OK);
        let echoed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(echoed["body"], "ping");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rpc_handler_calls_backend_over_http() {
        let service = service_with_backend(spawn_backend().await).await;
        let config = GatewayConfig {
            handler: "rpc".to_string(),
            ..Default::default()
        };
        let composed = Gateway::new(Arc::new(config), service).compose().unwrap();

        let (status, body) =
            call(&composed.handler, Method::POST, "/greeter/hello", r#"{"name":"john"}"#).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let echoed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(echoed["service"], "stack.rpc.api.greeter");
        assert!(echoed["body"].as_str().unwrap().contains("john"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_service_is_not_ok() {
        let service = service_with_backend(spawn_backend().await).await;
        let config = GatewayConfig {
            handler: "http".to_string(),
            ..Default::default()
        };
        let composed = Gateway::new(Arc::new(config), service).compose().unwrap();

        let (status, _) = call(&composed.handler, Method::GET, "/nobody/home", "").await;
        assert!(status.is_client_error() || status.is_server_error());
    }

    struct Counting {
        name: &'static str,
        hits: Arc<AtomicUsize>,
    }

    impl Plugin for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn wrap(&self, inner: BoxHandler) -> BoxHandler {
            let hits = self.hits.clone();
            BoxCloneSyncService::new(service_fn(move |req: Request| {
                hits.fetch_add(1, Ordering::SeqCst);
                inner.clone().oneshot(req)
            }))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_plugin_chain_modes() {
        let service = service_with_backend(spawn_backend().await).await;
        let hits = Arc::new(AtomicUsize::new(0));
        let plugin: Arc<dyn Plugin> = Arc::new(Counting {
            name: "counting",
            hits: hits.clone(),
        });

        let composed = Gateway::new(Arc::new(GatewayConfig::default()), service.clone())
            .with_plugin(plugin.clone())
            .compose()
            .unwrap();
        call(&composed.handler, Method::GET, "/", "").await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let doubled = GatewayConfig {
            plugin_chain: PluginChainMode::Doubled,
            ..Default::default()
        };
        let composed = Gateway::new(Arc::new(doubled), service)
            .with_plugin(plugin)
            .compose()
            .unwrap();
        call(&composed.handler, Method::GET, "/", "").await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(
            composed
                .plugins
                .iter()
                .filter(|name| name.as_str() == "counting")
                .count(),
            2
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registry_plugins_wrap_local_ones() {
        let service = service_with_backend(spawn_backend().await).await;
        let hits = Arc::new(AtomicUsize::new(0));
        let shared: Arc<dyn Plugin> = Arc::new(Counting {
            name: "shared-counting",
            hits: hits.clone(),
        });
        let registry = Arc::new(PluginRegistry::default());
        registry.register(shared.clone());

        let composed = Gateway::new(Arc::new(GatewayConfig::default()), service)
            .with_plugin_registry(registry)
            .with_plugin(Arc::new(Counting {
                name: "local-counting",
                hits: hits.clone(),
            }))
            .with_plugin(shared)
            .compose()
            .unwrap();

        assert_eq!(composed.plugins, vec!["shared-counting", "local-counting"]);
        call(&composed.handler, Method::GET, "/", "").await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
