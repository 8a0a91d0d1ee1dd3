use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event emitted by the `event` handler for every accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub topic: String,
    /// Remaining path segments joined by `.`; empty when the path only names the topic.
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub header: HashMap<String, String>,
    pub data: String,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PublishError {
    #[error("failed to publish to {topic}: {reason}")]
    Failed { topic: String, reason: String },
}

#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn publish(&self, event: Event) -> Result<(), PublishError>;
}
