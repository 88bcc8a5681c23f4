use async_trait::async_trait;
use domain::StatusEvent;
use domain::event::EventPublisher;
use std::sync::Arc;

/// Forwards every event to all inner publishers
pub struct CompositeEventPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(
        &self,
        event: StatusEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event.clone()).await {
                // one failing sink must not starve the others
                tracing::error!("Failed to publish event to one of the publishers: {}", e);
            }
        }
        Ok(())
    }

    async fn publish_batch(
        &self,
        events: Vec<StatusEvent>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish_batch(events.clone()).await {
                tracing::error!("Failed to publish batch to one of the publishers: {}", e);
            }
        }
        Ok(())
    }
}
