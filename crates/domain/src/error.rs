use thiserror::Error;

/// Errors raised inside a connection. They never travel past the orchestrator,
/// which turns them into log lines and zero change counts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid form data: {0}")]
    InvalidForm(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Session error: {0}")]
    Session(String),
}

impl ConnectionError {
    /// True for errors detected before any I/O took place.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint(_) | Self::InvalidForm(_) | Self::UnsupportedMethod(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
