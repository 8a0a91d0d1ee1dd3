//! TLS/ACME bootstrap.
//!
//! Decides once, before the listener is bound, how connections are secured:
//! ACME-managed certificates, a static certificate pair, or plain TCP.
use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc};

use rustls::ServerConfig;

use crate::{config::models::GatewayConfig, core::error::GatewayError};

/// ALPN protocols offered on TLS listeners.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Built-in ACME certificate providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmeProvider {
    /// Automatic issuance and renewal with TLS-ALPN-01 challenges answered
    /// on the main listener.
    Autocert,
}

impl AcmeProvider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "autocert" => Some(Self::Autocert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmeSettings {
    pub provider: AcmeProvider,
    pub hosts: Vec<String>,
    /// ACME directory URL.
    pub ca: String,
    pub cache_dir: PathBuf,
    pub contact: Option<String>,
}

/// How the gateway listener secures its connections.
#[derive(Clone)]
pub enum TransportMode {
    Plain,
    StaticTls(Arc<ServerConfig>),
    Acme(AcmeSettings),
}

impl TransportMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::StaticTls(_) => "tls",
            Self::Acme(_) => "acme",
        }
    }
}

impl std::fmt::Debug for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => f.write_str("Plain"),
            Self::StaticTls(_) => f.write_str("StaticTls"),
            Self::Acme(settings) => f.debug_tuple("Acme").field(settings).finish(),
        }
    }
}

/// Select the transport mode. ACME wins over static TLS, which wins over
/// plain TCP.
pub fn bootstrap_transport(config: &GatewayConfig) -> Result<TransportMode, GatewayError> {
    if config.enable_acme {
        let settings = acme_settings(config)?;
        tracing::info!(
            provider = %config.acme_provider,
            hosts = ?settings.hosts,
            ca = %settings.ca,
            "enabling ACME"
        );
        return Ok(TransportMode::Acme(settings));
    }

    if config.enable_tls {
        let (cert, key) = match (&config.tls_cert_file, &config.tls_key_file) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err(GatewayError::InvalidTls(
                    "TLS is enabled but tls_cert_file or tls_key_file is missing".to_string(),
                ));
            }
        };
        tracing::info!(cert = %cert, key = %key, "enabling TLS");
        return load_server_config(cert, key).map(TransportMode::StaticTls);
    }

    Ok(TransportMode::Plain)
}

fn acme_settings(config: &GatewayConfig) -> Result<AcmeSettings, GatewayError> {
    let provider = AcmeProvider::from_name(&config.acme_provider)
        .ok_or_else(|| GatewayError::UnknownAcmeProvider(config.acme_provider.clone()))?;

    let hosts: Vec<String> = config
        .acme_hosts
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();
    if hosts.is_empty() {
        return Err(GatewayError::NoAcmeHosts);
    }

    Ok(AcmeSettings {
        provider,
        hosts,
        ca: config.acme_ca.clone(),
        cache_dir: PathBuf::from(&config.acme_cache_dir),
        contact: config.acme_contact.clone(),
    })
}

/// Build a rustls server config from PEM certificate chain and key files.
pub fn load_server_config(cert_path: &str, key_path: &str) -> Result<Arc<ServerConfig>, GatewayError> {
    let open = |path: &str| {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| GatewayError::InvalidTls(format!("failed to open {path}: {e}")))
    };

    let certs = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::InvalidTls(format!("failed to parse {cert_path}: {e}")))?;
    if certs.is_empty() {
        return Err(GatewayError::InvalidTls(format!(
            "no certificates found in {cert_path}"
        )));
    }

    let key = rustls_pemfile::private_key(&mut open(key_path)?)
        .map_err(|e| GatewayError::InvalidTls(format!("failed to parse {key_path}: {e}")))?
        .ok_or_else(|| GatewayError::InvalidTls(format!("no private key found in {key_path}")))?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| GatewayError::InvalidTls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| GatewayError::InvalidTls(e.to_string()))?;
    server_config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(server_config))
}
