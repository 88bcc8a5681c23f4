use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use domain::{FormData, ItemKind, Technology};
use serde::{Deserialize, Serialize};

use crate::drivers::{DriverSettings, MqttSettings, OpcUaSettings};

fn enabled() -> bool {
    true
}

/// Which technologies take part in polling
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct UseTechConfig {
    #[serde(default = "enabled")]
    pub http: bool,
    #[serde(default = "enabled")]
    pub modbus: bool,
    #[serde(default = "enabled")]
    pub mqtt: bool,
    #[serde(default = "enabled")]
    pub opcua: bool,
}

impl Default for UseTechConfig {
    fn default() -> Self {
        Self {
            http: true,
            modbus: true,
            mqtt: true,
            opcua: true,
        }
    }
}

impl UseTechConfig {
    pub fn is_enabled(&self, technology: Technology) -> bool {
        match technology {
            Technology::Http => self.http,
            Technology::Modbus => self.modbus,
            Technology::Mqtt => self.mqtt,
            Technology::OpcUa => self.opcua,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_ms: u64,
}

fn default_http_timeout() -> u64 {
    5000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModbusConfig {
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    #[serde(default = "default_modbus_timeout")]
    pub timeout_ms: u64,
}

fn default_unit_id() -> u8 {
    255
}
fn default_modbus_timeout() -> u64 {
    2000
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            unit_id: default_unit_id(),
            timeout_ms: default_modbus_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_keep_alive() -> u64 {
    20
}
fn default_connect_timeout() -> u64 {
    3000
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpcUaConfig {
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_ms: u64,
    #[serde(default = "default_reconnect_period")]
    pub reconnect_period_ms: u64,
}

fn default_session_timeout() -> u64 {
    60_000
}
fn default_keep_alive_interval() -> u64 {
    5000
}
fn default_reconnect_period() -> u64 {
    10_000
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout(),
            keep_alive_interval_ms: default_keep_alive_interval(),
            reconnect_period_ms: default_reconnect_period(),
        }
    }
}

/// One item of an interface as written in the configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ItemConfig {
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub location: String,
    pub display_name: String,
    pub form: FormData,
}

/// One interface as written in the configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InterfaceConfig {
    pub technology: Technology,
    pub display_name: String,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub continuous: bool,
    #[serde(default)]
    pub use_tech: UseTechConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub modbus: ModbusConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub opcua: OpcUaConfig,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

fn default_poll_interval() -> u64 {
    200
}
fn default_max_concurrency() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_concurrency: default_max_concurrency(),
            continuous: false,
            use_tech: UseTechConfig::default(),
            http: HttpConfig::default(),
            modbus: ModbusConfig::default(),
            mqtt: MqttConfig::default(),
            opcua: OpcUaConfig::default(),
            interfaces: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("poll_interval_ms", default_poll_interval() as i64)?
            .set_default("max_concurrency", default_max_concurrency() as i64)?
            // config/default.toml is required so a typo in the directory is noticed
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(true))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // e.g. AID__POLL_INTERVAL_MS=500 or AID__USE_TECH__MQTT=false
            .add_source(Environment::with_prefix("AID").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            http_timeout: Duration::from_millis(self.http.timeout_ms),
            modbus_unit_id: self.modbus.unit_id,
            modbus_timeout: Duration::from_millis(self.modbus.timeout_ms),
            mqtt: MqttSettings {
                keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
                connect_timeout: Duration::from_millis(self.mqtt.connect_timeout_ms),
            },
            opcua: OpcUaSettings {
                session_timeout: Duration::from_millis(self.opcua.session_timeout_ms),
                keep_alive_interval: Duration::from_millis(self.opcua.keep_alive_interval_ms),
                reconnect_period: Duration::from_millis(self.opcua.reconnect_period_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(200));
        assert_eq!(cfg.max_concurrency, 10);
        assert!(!cfg.continuous);
        assert!(Technology::ALL.iter().all(|t| cfg.use_tech.is_enabled(*t)));

        let drivers = cfg.driver_settings();
        assert_eq!(drivers.modbus_unit_id, 255);
        assert_eq!(drivers.http_timeout, Duration::from_secs(5));
        assert_eq!(drivers.opcua.reconnect_period, Duration::from_secs(10));
    }

    #[test]
    fn test_interfaces_from_json() {
        let json = serde_json::json!({
            "use_tech": { "mqtt": false },
            "interfaces": [{
                "technology": "HTTP",
                "display_name": "Weather",
                "endpoint": "http://localhost:8080",
                "items": [{
                    "display_name": "temperature",
                    "form": { "href": "/temp", "htv_methodName": "GET" }
                }]
            }]
        });
        let cfg: AgentConfig = serde_json::from_value(json).unwrap();
        assert!(!cfg.use_tech.is_enabled(Technology::Mqtt));
        assert!(cfg.use_tech.is_enabled(Technology::Http));
        assert_eq!(cfg.interfaces.len(), 1);
        let item = &cfg.interfaces[0].items[0];
        assert_eq!(item.kind, ItemKind::Property);
        assert_eq!(item.form.http_method.as_deref(), Some("GET"));
    }
}
