use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use domain::ConnectionError;

use super::node_id::OpcNodeId;

/// Lifecycle of the client application behind an OPC UA connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    NotStarted,
    Starting,
    ErrorReadConfigFile,
    ErrorCreateApplication,
    ErrorDiscoverEndpoints,
    ErrorCreateSession,
    Running,
    Quitting,
    Quitted,
}

impl SessionStatus {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::ErrorReadConfigFile
                | Self::ErrorCreateApplication
                | Self::ErrorDiscoverEndpoints
                | Self::ErrorCreateSession
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Starting => "Starting",
            Self::ErrorReadConfigFile => "ErrorReadConfigFile",
            Self::ErrorCreateApplication => "ErrorCreateApplication",
            Self::ErrorDiscoverEndpoints => "ErrorDiscoverEndpoints",
            Self::ErrorCreateSession => "ErrorCreateSession",
            Self::Running => "Running",
            Self::Quitting => "Quitting",
            Self::Quitted => "Quitted",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User identity presented when activating a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Identity {
    pub fn from_uri(uri: &Url) -> Self {
        let user = match uri.username() {
            "" => None,
            u => Some(u.to_string()),
        };
        Self {
            user,
            password: uri.password().map(str::to_string),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }
}

/// Client stack that can discover endpoints and create sessions.
///
/// Every step maps to one error status of [`SessionStatus`] when it fails.
#[async_trait]
pub trait OpcUaBackend: Send + Sync {
    /// Loads the client configuration. Fails with `ErrorReadConfigFile`.
    async fn load_configuration(&self) -> Result<(), ConnectionError>;

    /// Creates the client application. Fails with `ErrorCreateApplication`.
    async fn create_application(&self) -> Result<(), ConnectionError>;

    /// Picks the endpoint to connect to. Fails with `ErrorDiscoverEndpoints`.
    async fn discover_endpoint(&self, server: &Url) -> Result<String, ConnectionError>;

    /// Creates and activates a session. Fails with `ErrorCreateSession`.
    async fn create_session(
        &self,
        endpoint: &str,
        identity: &Identity,
    ) -> Result<Arc<dyn OpcUaSession>, ConnectionError>;
}

/// An activated session
#[async_trait]
pub trait OpcUaSession: Send + Sync {
    /// Reads the value attribute of a node, rendered as text.
    async fn read_value(&self, node: &OpcNodeId) -> Result<String, ConnectionError>;

    /// Result of the last keep-alive; false once the server stopped answering.
    fn is_healthy(&self) -> bool;

    async fn close(&self);
}

/// Backend used when OPC UA support is not compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

#[async_trait]
impl OpcUaBackend for UnavailableBackend {
    async fn load_configuration(&self) -> Result<(), ConnectionError> {
        Ok(())
    }

    async fn create_application(&self) -> Result<(), ConnectionError> {
        Err(ConnectionError::Session(
            "OPC UA client support is not enabled in this build".to_string(),
        ))
    }

    async fn discover_endpoint(&self, server: &Url) -> Result<String, ConnectionError> {
        Err(ConnectionError::Session(format!(
            "Cannot discover endpoints of {}",
            server
        )))
    }

    async fn create_session(
        &self,
        endpoint: &str,
        _identity: &Identity,
    ) -> Result<Arc<dyn OpcUaSession>, ConnectionError> {
        Err(ConnectionError::Session(format!(
            "Cannot create session on {}",
            endpoint
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert!(SessionStatus::ErrorCreateSession.is_error());
        assert!(SessionStatus::ErrorReadConfigFile.is_error());
        assert!(!SessionStatus::Running.is_error());
        assert!(!SessionStatus::Quitted.is_error());
        assert_eq!(SessionStatus::default(), SessionStatus::NotStarted);
    }

    #[test]
    fn test_identity_from_uri() {
        let anon = Identity::from_uri(&Url::parse("opc.tcp://server:4840").unwrap());
        assert!(anon.is_anonymous());

        let named = Identity::from_uri(&Url::parse("opc.tcp://op:pw@server:4840").unwrap());
        assert_eq!(named.user.as_deref(), Some("op"));
        assert_eq!(named.password.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_at_application() {
        let backend = UnavailableBackend;
        assert!(backend.load_configuration().await.is_ok());
        assert!(backend.create_application().await.is_err());
    }
}
