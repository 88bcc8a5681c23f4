use async_trait::async_trait;
use domain::StatusEvent;
use domain::event::EventPublisher;

/// Writes events to the tracing output
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventPublisher;

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(
        &self,
        event: StatusEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match &event {
            StatusEvent::ItemValueChanged {
                interface,
                display_name,
                value,
                ..
            } => {
                tracing::debug!(interface = %interface, item = %display_name, value = %value, "Value changed");
            }
            StatusEvent::InterfaceOpened {
                interface,
                endpoint,
                ..
            } => {
                tracing::info!(interface = %interface, endpoint = %endpoint, "Interface opened");
            }
            StatusEvent::InterfaceFailed {
                interface, reason, ..
            } => {
                tracing::warn!(interface = %interface, reason = %reason, "Interface failed");
            }
        }
        Ok(())
    }
}
