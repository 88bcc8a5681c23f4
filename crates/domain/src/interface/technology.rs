use serde::{Deserialize, Serialize};

/// Protocol family of an asset interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technology {
    #[serde(rename = "HTTP", alias = "http")]
    Http,
    #[serde(rename = "Modbus", alias = "modbus")]
    Modbus,
    #[serde(rename = "MQTT", alias = "mqtt")]
    Mqtt,
    #[serde(rename = "OPC-UA", alias = "opcua", alias = "OPCUA")]
    OpcUa,
}

impl Technology {
    /// All technologies in polling order.
    pub const ALL: [Technology; 4] = [Self::Http, Self::Modbus, Self::Mqtt, Self::OpcUa];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Modbus => "Modbus",
            Self::Mqtt => "MQTT",
            Self::OpcUa => "OPC-UA",
        }
    }

    /// Position in [`Technology::ALL`], handy for per-technology arrays.
    pub fn index(&self) -> usize {
        match self {
            Self::Http => 0,
            Self::Modbus => 1,
            Self::Mqtt => 2,
            Self::OpcUa => 3,
        }
    }

    /// Maps a raw address (href, topic, node id) to the key items are stored under.
    ///
    /// MQTT topics are matched loosely: surrounding whitespace and slashes are
    /// dropped and case is ignored. All other technologies use the exact string.
    pub fn normalize_key(&self, raw: &str) -> String {
        match self {
            Self::Mqtt => raw.trim().trim_matches('/').to_lowercase(),
            _ => raw.to_string(),
        }
    }

    /// Whether values are pushed by the remote side instead of polled.
    pub fn is_push_based(&self) -> bool {
        matches!(self, Self::Mqtt)
    }
}

impl std::fmt::Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
