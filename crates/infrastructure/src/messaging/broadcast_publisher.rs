use async_trait::async_trait;
use domain::StatusEvent;
use domain::event::EventPublisher;
use tokio::sync::broadcast;

/// In-process event bus; every subscriber gets every event.
///
/// Publishing never blocks. Slow subscribers lag and lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<StatusEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(
        &self,
        event: StatusEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // no subscriber is not an error
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{InterfaceStatus, Technology};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = BroadcastEventPublisher::new(8);
        let mut rx = bus.subscribe();
        let iface = InterfaceStatus::new(Technology::Modbus, "PLC", "modbus+tcp://plc");

        bus.publish(StatusEvent::interface_failed(&iface, "refused"))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "InterfaceFailed");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = BroadcastEventPublisher::default();
        let iface = InterfaceStatus::new(Technology::Http, "A", "http://a");
        assert_eq!(bus.receiver_count(), 0);
        assert!(bus.publish(StatusEvent::interface_opened(&iface)).await.is_ok());
    }
}
