// Tests for layered configuration loading.

use std::fs;
use std::path::PathBuf;

use domain::{InterfaceSource, Technology};
use infrastructure::{AgentConfig, ConfigInterfaceSource};

fn temp_config_dir(default_toml: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("aid-config-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("default.toml"), default_toml).unwrap();
    dir
}

#[test]
fn test_load_from_directory() {
    let dir = temp_config_dir(
        r#"
continuous = true
max_concurrency = 4

[use_tech]
opcua = false

[modbus]
unit_id = 3

[[interfaces]]
technology = "HTTP"
display_name = "Weather station"
endpoint = "http://localhost:8080"

[[interfaces.items]]
display_name = "temperature"
location = "Weather/properties"
form = { href = "/temp", htv_methodName = "GET" }

[[interfaces]]
technology = "MQTT"
display_name = "Line broker"
endpoint = "mqtt://localhost:1883"

[[interfaces.items]]
kind = "event"
display_name = "alarm"
form = { href = "/Line1/Alarm", mqv_controlPacket = "mqv:subscribe" }
"#,
    );

    let cfg = AgentConfig::load(dir.to_str().unwrap()).unwrap();
    assert!(cfg.continuous);
    assert_eq!(cfg.max_concurrency, 4);
    assert_eq!(cfg.poll_interval_ms, 200);
    assert!(!cfg.use_tech.is_enabled(Technology::OpcUa));
    assert_eq!(cfg.driver_settings().modbus_unit_id, 3);

    let interfaces = ConfigInterfaceSource::new(cfg.interfaces.clone())
        .prepare_information()
        .unwrap();
    assert_eq!(interfaces.len(), 2);
    assert_eq!(interfaces[1].technology(), Technology::Mqtt);
    let alarms = interfaces[1].items().get_items_for("line1/alarm");
    assert_eq!(alarms.len(), 1);
    assert!(alarms[0].form().is_mqtt_subscribe());

    fs::remove_dir_all(dir).ok();
}

#[test]
fn test_missing_default_file_is_an_error() {
    let dir = std::env::temp_dir().join(format!("aid-config-{}", uuid::Uuid::new_v4()));
    assert!(AgentConfig::load(dir.to_str().unwrap()).is_err());
}
