//! Stack Gateway - an API gateway that composes pluggable parts into a single
//! HTTP pipeline.
//!
//! The gateway is assembled from small, swappable pieces following a
//! **hexagonal architecture**: resolvers map requests to backend services,
//! handlers turn a resolved request into an RPC call, an event, a proxied
//! HTTP request or a metadata document, and plugins wrap the resulting
//! handler as middleware.
//!
//! # Features
//! - Handler strategies: `api`, `rpc`, `event`, `http`/`proxy`, `web`, `meta`
//! - Resolver strategies: `host`, `path`, `grpc`, `stack`
//! - Global and per-gateway plugins composed into a deterministic chain
//! - Plain HTTP, static TLS certificates or ACME-managed certificates
//! - Fixed `/`, `/favicon.ico` and optional `/stats` routes
//! - Graceful shutdown driven by the owning service's lifecycle
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use stack_gateway::{
//!     Gateway, HttpClientAdapter, Service,
//!     adapters::{HttpRpcClient, MemoryBroker, MemoryRegistry},
//!     config::{ConfigOverrides, load_config},
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(load_config(Some("gateway.toml"), &ConfigOverrides::default())?);
//! let http = Arc::new(HttpClientAdapter::new()?);
//! let service = Arc::new(Service::new(
//!     config.server_name.clone(),
//!     config.version.clone(),
//!     Arc::new(MemoryRegistry::with_services(config.services.clone()).await),
//!     Arc::new(HttpRpcClient::new(http.clone(), &config.header_prefix, "/")?),
//!     Arc::new(MemoryBroker::default()),
//!     http,
//! ));
//! let _server = Gateway::new(config, service.clone()).run().await?;
//! service.lifecycle().stop().await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping composition logic inside `core`.
//!
//! # Error Handling
//! Composition and startup failures are [`GatewayError`] values; adapters and
//! lifecycle hooks return `eyre::Result<T>` with `WrapErr` context attached.
//!
//! # Concurrency & Data Structures
//! The in-memory registry uses `scc::HashMap` for shared mutable state.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::HttpClientAdapter,
    config::GatewayConfig,
    core::{Gateway, GatewayError, GatewayServer, Lifecycle, Service},
    ports::{http_client::HttpClient, plugin::Plugin},
    utils::GracefulShutdown,
};
