use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RpcError {
    /// The backend answered with an error of its own.
    #[error("{detail}")]
    Backend { code: u16, detail: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),
}

/// A single request/response call to a backend node.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub service: String,
    pub endpoint: String,
    /// `host:port` of the node chosen for this call.
    pub address: String,
    pub headers: HashMap<String, String>,
    pub body: serde_json::Value,
}

/// Transport used by the `rpc` and `api` handlers and by `/rpc`.
#[async_trait]
pub trait RpcClient: Send + Sync + 'static {
    async fn call(&self, request: RpcRequest) -> Result<serde_json::Value, RpcError>;
}
