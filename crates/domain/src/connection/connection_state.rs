use serde::{Deserialize, Serialize};

/// Transport state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// Never opened, or closed again
    #[default]
    Disconnected,
    /// `open()` in progress
    Connecting,
    /// Transport established
    Connected,
    /// Transport lost, a background reconnect is running
    Reconnecting,
    /// Last open attempt failed
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Opening is allowed from any resting state; an already open
    /// connection stays `Connected`.
    pub fn begin_open(self) -> Self {
        match self {
            Self::Connected => Self::Connected,
            _ => Self::Connecting,
        }
    }

    pub fn opened(self) -> Result<Self, &'static str> {
        match self {
            Self::Connecting | Self::Reconnecting | Self::Connected => Ok(Self::Connected),
            _ => Err("open can only complete from Connecting or Reconnecting"),
        }
    }

    pub fn lost(self) -> Result<Self, &'static str> {
        match self {
            Self::Connected => Ok(Self::Reconnecting),
            _ => Err("only a live connection can be lost"),
        }
    }

    pub fn failed(self) -> Self {
        Self::Failed
    }

    pub fn closed(self) -> Self {
        Self::Disconnected
    }
}
