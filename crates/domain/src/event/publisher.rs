use crate::StatusEvent;
use async_trait::async_trait;

/// Sink for status events (UI bus, logs, broker, ...)
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        event: StatusEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn publish_batch(
        &self,
        events: Vec<StatusEvent>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
