use thiserror::Error;

/// Errors raised while composing or starting the gateway. All of them are
/// fatal: the process reports them and exits.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("unknown ACME provider: {0}")]
    UnknownAcmeProvider(String),

    #[error("ACME is enabled but no hosts are configured")]
    NoAcmeHosts,

    #[error("invalid TLS material: {0}")]
    InvalidTls(String),

    #[error("invalid listen address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin {name} failed to initialise: {reason}")]
    PluginInit { name: String, reason: String },

    #[error("failed to build {handler} handler: {reason}")]
    HandlerConstruction { handler: String, reason: String },

    #[error("server already started")]
    AlreadyStarted,
}

pub type GatewayResult<T> = Result<T, GatewayError>;
