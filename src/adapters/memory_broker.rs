use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::ports::publisher::{Event, PublishError, Publisher};

/// In-process event broker backed by a tokio broadcast channel.
///
/// Publishing with no subscribers succeeds; events are simply dropped.
pub struct MemoryBroker {
    tx: broadcast::Sender<Event>,
}

impl MemoryBroker {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, event: Event) -> Result<(), PublishError> {
        let topic = event.topic.clone();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(%topic, receivers, "event published");
            }
            Err(_) => {
                tracing::debug!(%topic, "event published with no subscribers");
            }
        }
        Ok(())
    }
}
