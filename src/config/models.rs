//! Configuration data structures for the gateway.
//!
//! [`GatewayConfig`] is the single immutable snapshot every composition step
//! reads from. It is serde-friendly so the same shape can come from TOML,
//! YAML or JSON files, and every field has a compiled-in default so a bare
//! `stack-gateway` invocation still produces a working gateway.
use std::{
    net::{AddrParseError, SocketAddr},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::ports::registry::ServiceRecord;

pub const DEFAULT_SERVER_NAME: &str = "stack.rpc.gateway";
pub const DEFAULT_ADDRESS: &str = ":8080";
pub const DEFAULT_HANDLER: &str = "meta";
pub const DEFAULT_RESOLVER: &str = "stack";
pub const DEFAULT_NAMESPACE: &str = "stack.rpc.api";
pub const DEFAULT_API_PATH: &str = "/";
pub const DEFAULT_RPC_PATH: &str = "/rpc";
pub const DEFAULT_HEADER_PREFIX: &str = "X-Stack-";
pub const DEFAULT_ACME_PROVIDER: &str = "autocert";
pub const LETS_ENCRYPT_PRODUCTION_CA: &str = "https://acme-v02.api.letsencrypt.org/directory";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How the effective middleware list is derived from the registered plugins.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PluginChainMode {
    /// Every registered plugin wraps the handler exactly once.
    #[default]
    Single,
    /// Legacy behaviour: the registered list is appended to itself before
    /// wrapping, so every plugin wraps the handler twice.
    Doubled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

/// Resolved gateway configuration.
///
/// Built once at startup by [`crate::config::loader::load_config`] and shared
/// as `Arc<GatewayConfig>`; nothing mutates it after composition starts.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// Name the gateway registers itself under.
    pub server_name: String,
    /// Version reported by `GET /`.
    pub version: String,
    /// Bind address. A leading `:` (e.g. `:8080`) binds every interface.
    pub address: String,
    /// Handler strategy: `api`, `event`, `http`, `proxy`, `rpc`, `web`, anything else is `meta`.
    pub handler: String,
    /// Resolver strategy: `host`, `path`, `grpc`, anything else is `stack`.
    pub resolver: String,
    /// Service-name prefix applied by resolvers.
    pub namespace: String,
    pub api_path: String,
    pub rpc_path: String,
    pub header_prefix: String,
    /// Mount the direct RPC handler alongside the primary handler.
    pub enable_rpc: bool,
    /// Mount `/stats` and count every request.
    pub enable_stats: bool,

    pub enable_tls: bool,
    pub tls_cert_file: Option<String>,
    pub tls_key_file: Option<String>,

    pub enable_acme: bool,
    pub acme_provider: String,
    pub acme_ca: String,
    pub acme_hosts: Vec<String>,
    pub acme_cache_dir: String,
    pub acme_contact: Option<String>,

    /// Built-in plugins to enable, outermost first.
    pub plugins: Vec<String>,
    pub plugin_chain: PluginChainMode,

    /// Upper bound on draining in-flight requests during shutdown (humantime, e.g. `30s`).
    pub shutdown_timeout: String,

    pub log: LogConfig,

    /// Services seeded into the in-memory registry at startup.
    pub services: Vec<ServiceRecord>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            address: DEFAULT_ADDRESS.to_string(),
            handler: DEFAULT_HANDLER.to_string(),
            resolver: DEFAULT_RESOLVER.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_path: DEFAULT_API_PATH.to_string(),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            header_prefix: DEFAULT_HEADER_PREFIX.to_string(),
            enable_rpc: false,
            enable_stats: false,
            enable_tls: false,
            tls_cert_file: None,
            tls_key_file: None,
            enable_acme: false,
            acme_provider: DEFAULT_ACME_PROVIDER.to_string(),
            acme_ca: LETS_ENCRYPT_PRODUCTION_CA.to_string(),
            acme_hosts: Vec::new(),
            acme_cache_dir: "./acme-cache".to_string(),
            acme_contact: None,
            plugins: Vec::new(),
            plugin_chain: PluginChainMode::Single,
            shutdown_timeout: "30s".to_string(),
            log: LogConfig::default(),
            services: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Parsed drain timeout, falling back to the default when unparseable.
    pub fn shutdown_timeout(&self) -> Duration {
        humantime::parse_duration(&self.shutdown_timeout).unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

/// Parse a bind address, accepting the `:port` shorthand for all interfaces.
pub fn parse_bind_address(address: &str) -> Result<SocketAddr, AddrParseError> {
    match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}").parse(),
        None => address.parse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.address, ":8080");
        assert_eq!(config.handler, "meta");
        assert_eq!(config.resolver, "stack");
        assert_eq!(config.namespace, "stack.rpc.api");
        assert_eq!(config.acme_provider, "autocert");
        assert_eq!(config.acme_ca, LETS_ENCRYPT_PRODUCTION_CA);
        assert_eq!(config.plugin_chain, PluginChainMode::Single);
        assert!(!config.enable_rpc && !config.enable_tls && !config.enable_acme);
    }

    #[test]
    fn test_parse_bind_address_shorthand() {
        let addr = parse_bind_address(":8080").unwrap();
        assert_eq!(addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());

        let addr = parse_bind_address("127.0.0.1:9000").unwrap();
        assert_eq!(addr.port(), 9000);

        assert!(parse_bind_address("localhost").is_err());
    }

    #[test]
    fn test_shutdown_timeout_parsing() {
        let mut config = GatewayConfig::default();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));

        config.shutdown_timeout = "5s".to_string();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));

        config.shutdown_timeout = "soon".to_string();
        assert_eq!(config.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);
    }
}
