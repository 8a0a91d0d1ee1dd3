use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single running instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// `host:port` the instance listens on.
    pub address: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One version of a service together with its live nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// Error type for registry lookups
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Service discovery as seen by the gateway. The gateway only reads from it.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// All registered versions of `name`. Returns `NotFound` when none exist.
    async fn get_service(&self, name: &str) -> RegistryResult<Vec<ServiceRecord>>;

    async fn list_services(&self) -> RegistryResult<Vec<ServiceRecord>>;
}
