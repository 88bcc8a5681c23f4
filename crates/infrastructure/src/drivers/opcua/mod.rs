pub mod node_id;
pub mod session;

#[cfg(feature = "opcua")]
pub mod client;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use domain::{AidConnection, ConnectionError, ConnectionState, Item, Technology};

use super::base::ConnectionCore;
pub use node_id::{Identifier, OpcNodeId};
pub use session::{Identity, OpcUaBackend, OpcUaSession, SessionStatus, UnavailableBackend};

/// Timing of the client session
#[derive(Debug, Clone, Copy)]
pub struct OpcUaSettings {
    pub session_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub reconnect_period: Duration,
}

impl Default for OpcUaSettings {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(5),
            reconnect_period: Duration::from_secs(10),
        }
    }
}

struct Shared {
    core: ConnectionCore,
    settings: OpcUaSettings,
    backend: Arc<dyn OpcUaBackend>,
    identity: Identity,
    status: Mutex<SessionStatus>,
    session: RwLock<Option<Arc<dyn OpcUaSession>>>,
    endpoint: Mutex<Option<String>>,
    reconnecting: AtomicBool,
}

impl Shared {
    fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn session(&self) -> Option<Arc<dyn OpcUaSession>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap_session(&self, next: Option<Arc<dyn OpcUaSession>>) -> Option<Arc<dyn OpcUaSession>> {
        std::mem::replace(
            &mut *self.session.write().unwrap_or_else(PoisonError::into_inner),
            next,
        )
    }

    fn endpoint(&self) -> Option<String> {
        self.endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fail(&self, status: SessionStatus, error: ConnectionError) -> ConnectionError {
        warn!(endpoint = %self.core.target(), status = %status, "OPC UA start failed: {}", error);
        self.set_status(status);
        self.core.transition(ConnectionState::failed);
        ConnectionError::Session(format!("{}: {}", status, error))
    }

    /// Runs the start sequence, recording the status of the step that failed.
    async fn start(&self) -> Result<(), ConnectionError> {
        self.set_status(SessionStatus::Starting);

        self.backend
            .load_configuration()
            .await
            .map_err(|e| self.fail(SessionStatus::ErrorReadConfigFile, e))?;

        self.backend
            .create_application()
            .await
            .map_err(|e| self.fail(SessionStatus::ErrorCreateApplication, e))?;

        let endpoint = self
            .backend
            .discover_endpoint(self.core.target())
            .await
            .map_err(|e| self.fail(SessionStatus::ErrorDiscoverEndpoints, e))?;

        let session = self
            .backend
            .create_session(&endpoint, &self.identity)
            .await
            .map_err(|e| self.fail(SessionStatus::ErrorCreateSession, e))?;

        *self.endpoint.lock().unwrap_or_else(PoisonError::into_inner) = Some(endpoint.clone());
        if let Some(stale) = self.swap_session(Some(session)) {
            stale.close().await;
        }
        self.set_status(SessionStatus::Running);
        self.core.try_transition(ConnectionState::opened);
        self.core.touch();
        info!(endpoint = %endpoint, "OPC UA session running");
        Ok(())
    }

    /// Replaces the session with a fresh one. The old session keeps serving
    /// reads until the swap.
    async fn reconnect(&self) {
        let Some(endpoint) = self.endpoint() else {
            return;
        };
        let attempt = tokio::time::timeout(
            self.settings.reconnect_period,
            self.backend.create_session(&endpoint, &self.identity),
        )
        .await;

        match attempt {
            Ok(Ok(fresh)) => {
                if self.status() != SessionStatus::Running {
                    // closed while reconnecting
                    fresh.close().await;
                    return;
                }
                if let Some(old) = self.swap_session(Some(fresh)) {
                    old.close().await;
                }
                self.core.try_transition(ConnectionState::opened);
                self.core.touch();
                info!(endpoint = %endpoint, "OPC UA session reconnected");
            }
            Ok(Err(e)) => warn!(endpoint = %endpoint, "OPC UA reconnect failed: {}", e),
            Err(_) => warn!(
                endpoint = %endpoint,
                "OPC UA reconnect timed out after {:?}", self.settings.reconnect_period
            ),
        }
    }
}

/// Client session to an OPC UA server.
///
/// A keep-alive task watches the session; when the server stops answering a
/// replacement session is built in the background and swapped in, so reads
/// never wait for the reconnect.
pub struct OpcUaConnection {
    shared: Arc<Shared>,
    open_lock: TokioMutex<()>,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
}

impl OpcUaConnection {
    pub fn new(target: Url, settings: OpcUaSettings, backend: Arc<dyn OpcUaBackend>) -> Self {
        let identity = Identity::from_uri(&target);
        Self {
            shared: Arc::new(Shared {
                core: ConnectionCore::new(target),
                settings,
                backend,
                identity,
                status: Mutex::new(SessionStatus::NotStarted),
                session: RwLock::new(None),
                endpoint: Mutex::new(None),
                reconnecting: AtomicBool::new(false),
            }),
            open_lock: TokioMutex::new(()),
            keep_alive: Mutex::new(None),
        }
    }

    pub fn session_status(&self) -> SessionStatus {
        self.shared.status()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.core.state()
    }

    fn spawn_keep_alive(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shared.settings.keep_alive_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(session) = shared.session() else {
                    break;
                };
                if session.is_healthy() {
                    continue;
                }
                if shared.reconnecting.swap(true, Ordering::AcqRel) {
                    continue;
                }
                warn!(endpoint = %shared.core.target(), "OPC UA keep-alive failed, reconnecting");
                shared.core.try_transition(ConnectionState::lost);

                let shared = shared.clone();
                tokio::spawn(async move {
                    shared.reconnect().await;
                    shared.reconnecting.store(false, Ordering::Release);
                });
            }
        })
    }

    fn stop_keep_alive(&self) {
        if let Some(handle) = self
            .keep_alive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[async_trait]
impl AidConnection for OpcUaConnection {
    fn technology(&self) -> Technology {
        Technology::OpcUa
    }

    fn target_uri(&self) -> &Url {
        self.shared.core.target()
    }

    fn last_active(&self) -> Option<DateTime<Utc>> {
        self.shared.core.last_active()
    }

    async fn open(&self) -> Result<(), ConnectionError> {
        let _guard = self.open_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        self.stop_keep_alive();
        self.shared.core.transition(ConnectionState::begin_open);

        self.shared.start().await?;

        let handle = self.spawn_keep_alive();
        *self.keep_alive.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.status() == SessionStatus::Running && self.shared.session().is_some()
    }

    async fn close(&self) {
        let _guard = self.open_lock.lock().await;
        let status = self.shared.status();
        if status == SessionStatus::NotStarted || status == SessionStatus::Quitted {
            self.shared.core.transition(ConnectionState::closed);
            return;
        }

        self.shared.set_status(SessionStatus::Quitting);
        self.stop_keep_alive();
        if let Some(session) = self.shared.swap_session(None) {
            session.close().await;
        }
        self.shared.set_status(SessionStatus::Quitted);
        self.shared.core.transition(ConnectionState::closed);
        debug!(endpoint = %self.shared.core.target(), "OPC UA session closed");
    }

    async fn update_item_value(&self, item: &Item) -> Result<usize, ConnectionError> {
        let href = &item.form().href;
        let node = OpcNodeId::parse(href)
            .ok_or_else(|| ConnectionError::InvalidForm(format!("Invalid node id: {}", href)))?;
        let session = self.shared.session().ok_or(ConnectionError::NotConnected)?;

        let value = session.read_value(&node).await?;
        item.set_value(value);
        self.shared.core.touch();
        Ok(1)
    }
}

impl Drop for OpcUaConnection {
    fn drop(&mut self) {
        self.stop_keep_alive();
    }
}
