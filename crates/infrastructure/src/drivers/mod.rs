mod base;
pub mod http;
pub mod modbus;
pub mod mqtt;
pub mod opcua;

pub use http::HttpConnection;
pub use modbus::ModbusConnection;
pub use mqtt::{MqttConnection, MqttSettings};
pub use opcua::{OpcUaBackend, OpcUaConnection, OpcUaSettings, SessionStatus, UnavailableBackend};

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use domain::{AidConnection, ConnectionProvider, Technology};

/// Per-protocol settings applied to every connection the factory creates
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub http_timeout: Duration,
    pub modbus_unit_id: u8,
    pub modbus_timeout: Duration,
    pub mqtt: MqttSettings,
    pub opcua: OpcUaSettings,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(5),
            modbus_unit_id: 255,
            modbus_timeout: Duration::from_secs(2),
            mqtt: MqttSettings::default(),
            opcua: OpcUaSettings::default(),
        }
    }
}

/// Creates the protocol adapter for a technology
pub struct DriverFactory {
    settings: DriverSettings,
    opcua_backend: Arc<dyn OpcUaBackend>,
}

impl DriverFactory {
    pub fn new(settings: DriverSettings) -> Self {
        let opcua_backend = default_opcua_backend(&settings);
        Self {
            settings,
            opcua_backend,
        }
    }

    /// Replaces the OPC UA client stack, e.g. with a simulated server.
    pub fn with_opcua_backend(mut self, backend: Arc<dyn OpcUaBackend>) -> Self {
        self.opcua_backend = backend;
        self
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }
}

impl Default for DriverFactory {
    fn default() -> Self {
        Self::new(DriverSettings::default())
    }
}

#[cfg(feature = "opcua")]
fn default_opcua_backend(settings: &DriverSettings) -> Arc<dyn OpcUaBackend> {
    Arc::new(self::opcua::client::OpcUaClientBackend::new(
        "aid-agent",
        std::path::PathBuf::from("pki"),
        settings.opcua.session_timeout,
    ))
}

#[cfg(not(feature = "opcua"))]
fn default_opcua_backend(_settings: &DriverSettings) -> Arc<dyn OpcUaBackend> {
    tracing::debug!("Built without OPC UA client support");
    Arc::new(UnavailableBackend)
}

impl ConnectionProvider for DriverFactory {
    fn create(&self, technology: Technology, uri: &Url) -> Arc<dyn AidConnection> {
        let uri = uri.clone();
        match technology {
            Technology::Http => Arc::new(HttpConnection::new(uri, self.settings.http_timeout)),
            Technology::Modbus => Arc::new(ModbusConnection::new(
                uri,
                self.settings.modbus_unit_id,
                self.settings.modbus_timeout,
            )),
            Technology::Mqtt => Arc::new(MqttConnection::new(uri, self.settings.mqtt)),
            Technology::OpcUa => Arc::new(OpcUaConnection::new(
                uri,
                self.settings.opcua,
                self.opcua_backend.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creates_matching_technology() {
        let factory = DriverFactory::default();
        let cases = [
            (Technology::Http, "http://device.local/"),
            (Technology::Modbus, "modbus+tcp://plc:502"),
            (Technology::Mqtt, "mqtt://broker:1883"),
            (Technology::OpcUa, "opc.tcp://server:4840"),
        ];
        for (tech, uri) in cases {
            let conn = factory.create(tech, &Url::parse(uri).unwrap());
            assert_eq!(conn.technology(), tech);
            assert_eq!(conn.target_uri().as_str(), Url::parse(uri).unwrap().as_str());
            assert!(!conn.is_connected());
        }
    }

    #[test]
    fn test_only_http_reads_concurrently() {
        let factory = DriverFactory::default();
        let http = factory.create(Technology::Http, &Url::parse("http://a/").unwrap());
        let modbus = factory.create(Technology::Modbus, &Url::parse("modbus+tcp://a").unwrap());
        assert!(http.supports_concurrent_updates());
        assert!(!modbus.supports_concurrent_updates());
    }
}
