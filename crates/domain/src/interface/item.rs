use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// What an item represents on the remote interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Property,
    Action,
    Event,
}

/// Protocol-specific addressing of an item, immutable once discovered.
///
/// Only the fields relevant for the owning interface's technology are set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormData {
    /// Relative URL (HTTP), register address (Modbus), topic (MQTT) or node id (OPC UA)
    pub href: String,
    #[serde(default, alias = "contentType", alias = "contenttype")]
    pub content_type: Option<String>,
    #[serde(default, alias = "htv_methodName", alias = "htv_methodname")]
    pub http_method: Option<String>,
    #[serde(default, alias = "modv_function")]
    pub modbus_function: Option<String>,
    #[serde(default, alias = "modv_type")]
    pub modbus_type: Option<String>,
    #[serde(default, alias = "mqv_controlPacket", alias = "mqv_controlpacket")]
    pub mqtt_control_packet: Option<String>,
    #[serde(default, alias = "mqv_retain")]
    pub mqtt_retain: Option<bool>,
}

impl FormData {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Default::default()
        }
    }

    /// HTTP method in upper case, GET when none was declared.
    pub fn http_method_or_get(&self) -> String {
        self.http_method
            .as_deref()
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string())
    }

    /// Whether the MQTT control packet asks for a subscription.
    pub fn is_mqtt_subscribe(&self) -> bool {
        self.mqtt_control_packet
            .as_deref()
            .map(|p| p.to_lowercase().contains("subscribe"))
            .unwrap_or(false)
    }
}

/// Opaque link to a widget showing an item's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderHandle(pub u64);

/// One data point of a remote interface.
///
/// The value is written by the owning connection only; readers get a copy.
#[derive(Debug)]
pub struct Item {
    kind: ItemKind,
    location: String,
    display_name: String,
    form: FormData,
    value: RwLock<String>,
    changed: AtomicBool,
    render: RwLock<Option<RenderHandle>>,
}

impl Item {
    pub fn new(
        kind: ItemKind,
        location: impl Into<String>,
        display_name: impl Into<String>,
        form: FormData,
    ) -> Self {
        Self {
            kind,
            location: location.into(),
            display_name: display_name.into(),
            form,
            value: RwLock::new(String::new()),
            changed: AtomicBool::new(false),
            render: RwLock::new(None),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn form(&self) -> &FormData {
        &self.form
    }

    pub fn value(&self) -> String {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores a new value. Returns true when it differs from the previous one,
    /// in which case the item is flagged until [`Item::take_changed`] is called.
    pub fn set_value(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        let mut current = self.value.write().unwrap_or_else(PoisonError::into_inner);
        if *current == value {
            return false;
        }
        *current = value;
        self.changed.store(true, Ordering::Release);
        true
    }

    /// Clears and returns the "changed since last drain" flag.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    pub fn render_handle(&self) -> Option<RenderHandle> {
        *self.render.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach_render_handle(&self, handle: Option<RenderHandle>) {
        *self.render.write().unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(href: &str) -> Item {
        Item::new(ItemKind::Property, "iface/props", "Temperature", FormData::new(href))
    }

    #[test]
    fn test_new_item_has_empty_value() {
        let it = item("/temp");
        assert_eq!(it.value(), "");
        assert!(!it.take_changed());
        assert_eq!(it.form().href, "/temp");
    }

    #[test]
    fn test_set_value_flags_change_once() {
        let it = item("/temp");
        assert!(it.set_value("21.5"));
        assert!(!it.set_value("21.5"));
        assert!(it.take_changed());
        assert!(!it.take_changed());
        assert_eq!(it.value(), "21.5");
    }

    #[test]
    fn test_http_method_defaults_to_get() {
        let mut form = FormData::new("/status");
        assert_eq!(form.http_method_or_get(), "GET");
        form.http_method = Some(" post ".into());
        assert_eq!(form.http_method_or_get(), "POST");
    }

    #[test]
    fn test_mqtt_subscribe_detection() {
        let mut form = FormData::new("plant/temp");
        assert!(!form.is_mqtt_subscribe());
        form.mqtt_control_packet = Some("mqv:subscribe".into());
        assert!(form.is_mqtt_subscribe());
        form.mqtt_control_packet = Some("publish".into());
        assert!(!form.is_mqtt_subscribe());
    }

    #[test]
    fn test_form_accepts_binding_aliases() {
        let form: FormData = serde_json::from_value(serde_json::json!({
            "href": "40001?quantity=2",
            "modv_type": "float_be",
            "modv_function": "readHoldingRegisters"
        }))
        .unwrap();
        assert_eq!(form.modbus_type.as_deref(), Some("float_be"));
        assert_eq!(form.modbus_function.as_deref(), Some("readHoldingRegisters"));
    }

    #[test]
    fn test_render_handle_roundtrip() {
        let it = item("/temp");
        assert_eq!(it.render_handle(), None);
        it.attach_render_handle(Some(RenderHandle(7)));
        assert_eq!(it.render_handle(), Some(RenderHandle(7)));
    }
}
