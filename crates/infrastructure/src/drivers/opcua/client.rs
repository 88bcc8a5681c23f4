use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opcua::client::prelude::{
    AttributeId, AttributeService, Client, ClientBuilder, IdentityToken, MessageSecurityMode,
    NodeId, QualifiedName, ReadValueId, SecurityPolicy, Session, TimestampsToReturn, UAString,
    UserTokenPolicy,
};
use opcua::sync::RwLock;
use url::Url;

use domain::ConnectionError;

use super::node_id::{Identifier, OpcNodeId};
use super::session::{Identity, OpcUaBackend, OpcUaSession};

/// Backend on top of the `opcua` client stack. Its API is blocking, so every
/// call runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct OpcUaClientBackend {
    application_name: String,
    pki_dir: PathBuf,
    session_timeout: Duration,
}

impl OpcUaClientBackend {
    pub fn new(application_name: impl Into<String>, pki_dir: PathBuf, session_timeout: Duration) -> Self {
        Self {
            application_name: application_name.into(),
            pki_dir,
            session_timeout,
        }
    }

    fn build_client(&self) -> Result<Client, ConnectionError> {
        ClientBuilder::new()
            .application_name(self.application_name.as_str())
            .application_uri(format!("urn:{}", self.application_name))
            .product_uri(format!("urn:{}", self.application_name))
            .pki_dir(self.pki_dir.clone())
            .trust_server_certs(true)
            .create_sample_keypair(true)
            .session_retry_limit(0)
            .session_timeout(self.session_timeout.as_millis() as u32)
            .client()
            .ok_or_else(|| ConnectionError::Session("Invalid client configuration".to_string()))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ConnectionError>
where
    F: FnOnce() -> Result<T, ConnectionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConnectionError::Session(format!("OPC UA worker failed: {}", e)))?
}

#[async_trait]
impl OpcUaBackend for OpcUaClientBackend {
    async fn load_configuration(&self) -> Result<(), ConnectionError> {
        let dir = self.pki_dir.clone();
        blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| {
                ConnectionError::Session(format!("Cannot prepare {}: {}", dir.display(), e))
            })
        })
        .await
    }

    async fn create_application(&self) -> Result<(), ConnectionError> {
        let backend = self.clone();
        blocking(move || backend.build_client().map(|_| ())).await
    }

    async fn discover_endpoint(&self, server: &Url) -> Result<String, ConnectionError> {
        let backend = self.clone();
        let server = server.to_string();
        blocking(move || {
            let client = backend.build_client()?;
            let endpoints = client
                .get_server_endpoints_from_url(server.as_str())
                .map_err(|status| ConnectionError::Session(format!("{}", status)))?;

            endpoints
                .iter()
                .find(|e| e.security_mode == MessageSecurityMode::None)
                .map(|e| e.endpoint_url.as_ref().to_string())
                .ok_or_else(|| {
                    ConnectionError::Session(format!("No unsecured endpoint offered by {}", server))
                })
        })
        .await
    }

    async fn create_session(
        &self,
        endpoint: &str,
        identity: &Identity,
    ) -> Result<Arc<dyn OpcUaSession>, ConnectionError> {
        let backend = self.clone();
        let endpoint = endpoint.to_string();
        let token = match (&identity.user, &identity.password) {
            (Some(user), password) => {
                IdentityToken::UserName(user.clone(), password.clone().unwrap_or_default())
            }
            (None, _) => IdentityToken::Anonymous,
        };

        blocking(move || {
            let mut client = backend.build_client()?;
            let session = client
                .connect_to_endpoint(
                    (
                        endpoint.as_str(),
                        SecurityPolicy::None.to_str(),
                        MessageSecurityMode::None,
                        UserTokenPolicy::anonymous(),
                    ),
                    token,
                )
                .map_err(|status| ConnectionError::Session(format!("{}", status)))?;

            Ok(Arc::new(ClientSession {
                _client: Mutex::new(client),
                session,
            }) as Arc<dyn OpcUaSession>)
        })
        .await
    }
}

struct ClientSession {
    _client: Mutex<Client>,
    session: Arc<RwLock<Session>>,
}

fn to_node_id(node: &OpcNodeId) -> NodeId {
    match &node.identifier {
        Identifier::Numeric(id) => NodeId::new(node.namespace, *id),
        Identifier::String(id) => NodeId::new(node.namespace, id.clone()),
    }
}

#[async_trait]
impl OpcUaSession for ClientSession {
    async fn read_value(&self, node: &OpcNodeId) -> Result<String, ConnectionError> {
        let session = self.session.clone();
        let read = ReadValueId {
            node_id: to_node_id(node),
            attribute_id: AttributeId::Value as u32,
            index_range: UAString::null(),
            data_encoding: QualifiedName::null(),
        };
        let label = node.to_string();

        blocking(move || {
            let values = session
                .read()
                .read(&[read], TimestampsToReturn::Neither, 0.0)
                .map_err(|status| ConnectionError::Transport(format!("{}", status)))?;

            let value = values
                .into_iter()
                .next()
                .ok_or_else(|| ConnectionError::Decode(format!("No result for {}", label)))?;

            if let Some(status) = value.status {
                if status.is_bad() {
                    return Err(ConnectionError::Transport(format!("{}: {}", label, status)));
                }
            }
            Ok(value.value.map(|v| v.to_string()).unwrap_or_default())
        })
        .await
    }

    fn is_healthy(&self) -> bool {
        self.session.read().is_connected()
    }

    async fn close(&self) {
        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || session.write().disconnect()).await;
    }
}
