use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod publisher;
pub use publisher::EventPublisher;

use crate::interface::{InterfaceStatus, Item, RenderHandle, Technology};

/// Events emitted by the polling subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatusEvent {
    /// An item's value changed since the last drain
    ItemValueChanged {
        interface: String,
        location: String,
        display_name: String,
        value: String,
        render: Option<RenderHandle>,
        timestamp: DateTime<Utc>,
    },

    /// An interface's connection was opened
    InterfaceOpened {
        interface: String,
        technology: Technology,
        endpoint: String,
        timestamp: DateTime<Utc>,
    },

    /// An interface's connection could not be opened
    InterfaceFailed {
        interface: String,
        technology: Technology,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl StatusEvent {
    pub fn item_value_changed(interface: &InterfaceStatus, item: &Item) -> Self {
        Self::ItemValueChanged {
            interface: interface.display_name().to_string(),
            location: item.location().to_string(),
            display_name: item.display_name().to_string(),
            value: item.value(),
            render: item.render_handle(),
            timestamp: Utc::now(),
        }
    }

    pub fn interface_opened(interface: &InterfaceStatus) -> Self {
        Self::InterfaceOpened {
            interface: interface.display_name().to_string(),
            technology: interface.technology(),
            endpoint: interface.endpoint_base().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn interface_failed(interface: &InterfaceStatus, reason: impl Into<String>) -> Self {
        Self::InterfaceFailed {
            interface: interface.display_name().to_string(),
            technology: interface.technology(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ItemValueChanged { timestamp, .. } => *timestamp,
            Self::InterfaceOpened { timestamp, .. } => *timestamp,
            Self::InterfaceFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::ItemValueChanged { .. } => "ItemValueChanged",
            Self::InterfaceOpened { .. } => "InterfaceOpened",
            Self::InterfaceFailed { .. } => "InterfaceFailed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{FormData, ItemKind};

    fn interface_with_item() -> (InterfaceStatus, std::sync::Arc<Item>) {
        let mut iface = InterfaceStatus::new(Technology::Http, "Weather", "http://localhost");
        let item = iface.add_item(Item::new(
            ItemKind::Property,
            "Weather/properties",
            "temperature",
            FormData::new("/temp"),
        ));
        (iface, item)
    }

    #[test]
    fn test_item_value_changed_snapshot() {
        let (iface, item) = interface_with_item();
        item.set_value("23.4");
        item.attach_render_handle(Some(RenderHandle(3)));

        let event = StatusEvent::item_value_changed(&iface, &item);
        assert_eq!(event.event_type(), "ItemValueChanged");
        match event {
            StatusEvent::ItemValueChanged {
                interface,
                location,
                value,
                render,
                ..
            } => {
                assert_eq!(interface, "Weather");
                assert_eq!(location, "Weather/properties");
                assert_eq!(value, "23.4");
                assert_eq!(render, Some(RenderHandle(3)));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_failed_event_serialization() {
        let (iface, _) = interface_with_item();
        let event = StatusEvent::interface_failed(&iface, "refused");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "InterfaceFailed");
        assert_eq!(json["technology"], "HTTP");
        assert_eq!(json["reason"], "refused");
    }
}
