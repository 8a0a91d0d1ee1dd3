use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Command line / environment overrides layered on top of file configuration.
///
/// Every option is accepted both as a flag and as an environment variable;
/// clap resolves the two so that the flag wins when both are set. Options
/// that were not supplied stay `None` and leave lower layers untouched.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct ConfigOverrides {
    /// Name the gateway registers itself under
    #[arg(long = "server_name", env = "MICRO_SERVER_NAME")]
    pub server_name: Option<String>,

    /// Set the api address e.g 0.0.0.0:8080
    #[arg(long, env = "MICRO_API_ADDRESS")]
    pub address: Option<String>,

    /// Specify the request handler to be used for mapping HTTP requests to services; {api, event, http, rpc, web}
    #[arg(long, env = "MICRO_API_HANDLER")]
    pub handler: Option<String>,

    /// Set the namespace used by the API e.g. com.example.api
    #[arg(long, env = "MICRO_API_NAMESPACE")]
    pub namespace: Option<String>,

    /// Set the hostname resolver used by the API {host, path, grpc}
    #[arg(long, env = "MICRO_API_RESOLVER")]
    pub resolver: Option<String>,

    /// Enable call the backend directly via /rpc
    #[arg(long = "enable_rpc", env = "MICRO_API_ENABLE_RPC", num_args = 0..=1, default_missing_value = "true")]
    pub enable_rpc: Option<bool>,

    /// Serve TLS using the configured certificate and key
    #[arg(long = "enable_tls", env = "MICRO_ENABLE_TLS", num_args = 0..=1, default_missing_value = "true")]
    pub enable_tls: Option<bool>,

    #[arg(long = "tls_cert_file", env = "MICRO_TLS_CERT_FILE")]
    pub tls_cert_file: Option<String>,

    #[arg(long = "tls_key_file", env = "MICRO_TLS_KEY_FILE")]
    pub tls_key_file: Option<String>,

    /// Obtain certificates automatically via ACME (takes priority over --enable_tls)
    #[arg(long = "enable_acme", env = "MICRO_ENABLE_ACME", num_args = 0..=1, default_missing_value = "true")]
    pub enable_acme: Option<bool>,

    /// ACME provider; only `autocert` is supported
    #[arg(long = "acme_provider", env = "MICRO_ACME_PROVIDER")]
    pub acme_provider: Option<String>,

    /// ACME CA directory URL
    #[arg(long = "acme_ca", env = "MICRO_ACME_CA")]
    pub acme_ca: Option<String>,

    /// Comma separated hostnames to request certificates for
    #[arg(long = "acme_hosts", env = "MICRO_ACME_HOSTS", value_delimiter = ',')]
    pub acme_hosts: Option<Vec<String>>,

    /// Mount /stats and count all requests
    #[arg(long = "enable_stats", env = "MICRO_ENABLE_STATS", num_args = 0..=1, default_missing_value = "true")]
    pub enable_stats: Option<bool>,

    /// Comma separated built-in plugins to enable, outermost first
    #[arg(long, env = "MICRO_API_PLUGINS", value_delimiter = ',')]
    pub plugins: Option<Vec<String>>,
}

fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    }
}

/// Build the immutable gateway configuration.
///
/// Layers, lowest priority first: compiled-in defaults, the optional config
/// file, then flag/environment overrides.
pub fn load_config(config_path: Option<&str>, overrides: &ConfigOverrides) -> Result<GatewayConfig> {
    let mut builder = Config::builder().add_source(
        Config::try_from(&GatewayConfig::default()).context("Failed to encode default config")?,
    );

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);
        builder = builder.add_source(File::new(config_path, file_format(path)).required(false));
    }

    let settings = builder
        .set_override_option("server_name", overrides.server_name.clone())?
        .set_override_option("address", overrides.address.clone())?
        .set_override_option("handler", overrides.handler.clone())?
        .set_override_option("namespace", overrides.namespace.clone())?
        .set_override_option("resolver", overrides.resolver.clone())?
        .set_override_option("enable_rpc", overrides.enable_rpc)?
        .set_override_option("enable_tls", overrides.enable_tls)?
        .set_override_option("tls_cert_file", overrides.tls_cert_file.clone())?
        .set_override_option("tls_key_file", overrides.tls_key_file.clone())?
        .set_override_option("enable_acme", overrides.enable_acme)?
        .set_override_option("acme_provider", overrides.acme_provider.clone())?
        .set_override_option("acme_ca", overrides.acme_ca.clone())?
        .set_override_option("acme_hosts", overrides.acme_hosts.clone())?
        .set_override_option("enable_stats", overrides.enable_stats)?
        .set_override_option("plugins", overrides.plugins.clone())?
        .build()
        .with_context(|| {
            format!(
                "Failed to build config from {}",
                config_path.unwrap_or("<defaults>")
            )
        })?;

    let config: GatewayConfig = settings
        .try_deserialize()
        .context("Failed to deserialize gateway config")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::models::PluginChainMode;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config(None, &ConfigOverrides::default()).unwrap();
        assert_eq!(config.address, ":8080");
        assert_eq!(config.handler, "meta");
        assert_eq!(config.namespace, "stack.rpc.api");
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_load_toml_config() {
        let toml_content = r#"
address = "127.0.0.1:3000"
handler = "api"
enable_rpc = true
plugins = ["cors", "request_id"]
plugin_chain = "doubled"

[[services]]
name = "stack.rpc.api.greeter"
version = "1.0.0"
nodes = [{ id = "greeter-1", address = "127.0.0.1:9001" }]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config =
            load_config(temp_file.path().to_str(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.address, "127.0.0.1:3000");
        assert_eq!(config.handler, "api");
        assert!(config.enable_rpc);
        assert_eq!(config.plugins, vec!["cors", "request_id"]);
        assert_eq!(config.plugin_chain, PluginChainMode::Doubled);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].nodes[0].address, "127.0.0.1:9001");
        // untouched keys keep their defaults
        assert_eq!(config.resolver, "stack");
    }

    #[test]
    fn test_load_yaml_config() {
        let yaml_content = r#"
address: "127.0.0.1:4000"
resolver: "path"
enable_stats: true
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config =
            load_config(temp_file.path().to_str(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.address, "127.0.0.1:4000");
        assert_eq!(config.resolver, "path");
        assert!(config.enable_stats);
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "handler = \"api\"\nenable_rpc = true\n").unwrap();

        let overrides = ConfigOverrides {
            handler: Some("web".to_string()),
            enable_rpc: Some(false),
            acme_hosts: Some(vec!["example.com".to_string()]),
            ..Default::default()
        };

        let config = load_config(temp_file.path().to_str(), &overrides).unwrap();
        assert_eq!(config.handler, "web");
        assert!(!config.enable_rpc);
        assert_eq!(config.acme_hosts, vec!["example.com"]);
    }
}
